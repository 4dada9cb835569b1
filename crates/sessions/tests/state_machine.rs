//! End-to-end behaviour of the session state machine against a scripted
//! provider and an in-memory session backend.

use std::sync::Arc;

use chrono::Utc;
use pt_domain::config::{CacheConfig, DialogConfig};
use pt_domain::profile::{Profile, ProfileMeta};
use pt_domain::taxonomy::{Complexity, Openness};
use pt_domain::Error;
use pt_providers::scripted::ScriptedProvider;
use pt_providers::{CacheAwareClient, CacheLedger, RoleBinding};
use pt_sessions::{
    Archive, MemoryBackend, SessionError, SessionManager, SessionStatus, SessionStore,
    StartOutcome,
};
use tempfile::TempDir;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Harness {
    manager: SessionManager,
    patient: Arc<ScriptedProvider>,
    analyst: Arc<ScriptedProvider>,
    backend: Arc<MemoryBackend>,
    _dir: TempDir,
}

fn client(role: &str, provider: Arc<ScriptedProvider>, ledger: Arc<CacheLedger>) -> CacheAwareClient {
    let binding = RoleBinding {
        provider,
        model: None,
        temperature: None,
    };
    CacheAwareClient::new(role, binding, CacheConfig::default(), ledger)
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(SessionStore::new(backend.clone()).unwrap());
    let patient = Arc::new(ScriptedProvider::new("patient"));
    let analyst = Arc::new(ScriptedProvider::new("analyst"));
    let ledger = Arc::new(CacheLedger::new(0.9));
    let manager = SessionManager::new(
        store,
        Archive::new(dir.path()),
        client("patient", patient.clone(), ledger.clone()),
        client("analyst", analyst.clone(), ledger),
        DialogConfig::default(),
    );
    Harness {
        manager,
        patient,
        analyst,
        backend,
        _dir: dir,
    }
}

fn anna() -> Profile {
    Profile {
        id: None,
        name: "Anna".into(),
        age: 34,
        gender: "female".into(),
        profession: "accountant".into(),
        problem: "I panic before every report".into(),
        symptoms: vec!["insomnia".into(), "racing heart".into()],
        motivation: "my sister insisted".into(),
        attitude: "not sure this helps".into(),
        history: "since the promotion".into(),
        triggers: vec!["deadlines".into()],
        coping: vec!["overworking".into()],
        defenses: vec!["rationalization".into()],
        speech: "fast, hedging".into(),
        resistance: "changes the subject".into(),
        background: "eldest of three".into(),
        meta: ProfileMeta {
            category: "anxiety".into(),
            category_name: "Anxiety disorders".into(),
            diagnosis: "Generalized anxiety disorder".into(),
            complexity: Complexity::new(3).unwrap(),
            openness: Openness::Ambivalent,
            created_at: Utc::now(),
            token_usage: None,
        },
        saved_at: None,
    }
}

async fn started(h: &Harness, user: &str) {
    let out = h.manager.start_session(user, anna(), false).await.unwrap();
    assert!(matches!(out, StartOutcome::Started { replaced: false, .. }));
}

/// Scenarios A, B and C in sequence.
async fn two_exchanges_with_continuation(h: &Harness, user: &str) {
    started(h, user).await;
    h.patient.push_reply("I've been feeling anxious lately.");
    h.patient.push_truncated("It started three months ago when...");
    h.patient.push_reply(" my job changed.");

    h.manager
        .submit_turn(user, "Hello, what brings you here?")
        .await
        .unwrap();
    h.manager.submit_turn(user, "Tell me more").await.unwrap();
    h.manager.submit_turn(user, "continue").await.unwrap();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dialog scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn opening_turn_is_recorded_without_history() {
    let h = harness();
    started(&h, "u1").await;
    h.patient.push_reply("I've been feeling anxious lately.");

    let reply = h
        .manager
        .submit_turn("u1", "Hello, what brings you here?")
        .await
        .unwrap();

    assert_eq!(reply.text, "I've been feeling anxious lately.");
    assert!(!reply.truncated);
    let s = h.manager.session("u1");
    assert_eq!(s.transcript.len(), 1);
    assert_eq!(s.transcript[0].therapist, "Hello, what brings you here?");
    assert_eq!(s.transcript[0].patient, "I've been feeling anxious lately.");
    assert!(s.pending.is_none());

    let req = h.patient.last_request().unwrap();
    assert_eq!(req.messages.len(), 1);
    assert_eq!(req.max_tokens, 200);
    assert!(req.system.is_cache_tagged());
}

#[tokio::test]
async fn truncated_reply_is_stored_and_flagged() {
    let h = harness();
    started(&h, "u1").await;
    h.patient.push_reply("I've been feeling anxious lately.");
    h.patient.push_truncated("It started three months ago when...");

    h.manager.submit_turn("u1", "Hello, what brings you here?").await.unwrap();
    let reply = h.manager.submit_turn("u1", "Tell me more").await.unwrap();

    assert!(reply.truncated);
    assert!(reply.text.starts_with("It started three months ago when..."));
    assert!(reply.text.ends_with(&DialogConfig::default().continuation_hint));
    let s = h.manager.session("u1");
    assert_eq!(s.transcript.len(), 2);
    assert_eq!(s.transcript[1].patient, "It started three months ago when...");
    assert_eq!(s.pending.map(|p| p.index), Some(1));

    let req = h.patient.last_request().unwrap();
    assert_eq!(req.messages.len(), 3);
}

#[tokio::test]
async fn continuation_merges_into_the_same_entry() {
    let h = harness();
    two_exchanges_with_continuation(&h, "u1").await;

    let s = h.manager.session("u1");
    assert_eq!(s.transcript.len(), 2);
    assert_eq!(
        s.transcript[1].patient,
        "It started three months ago when... my job changed."
    );
    assert!(s.pending.is_none());
    assert!(s.check_invariants().is_ok());

    // The continuation asked for the rest, not a reply to "continue".
    let req = h.patient.last_request().unwrap();
    let last = req.messages.last().unwrap();
    assert_eq!(last.content, DialogConfig::default().continue_prompt);
    assert_eq!(req.messages[req.messages.len() - 2].content, "It started three months ago when...");
    assert!(!req.messages.iter().any(|m| m.content == "continue"));
}

#[tokio::test]
async fn chained_truncation_keeps_one_entry() {
    let h = harness();
    started(&h, "u1").await;
    h.patient.push_truncated("Well");
    h.patient.push_truncated(" it is");
    h.patient.push_reply(" complicated.");

    h.manager.submit_turn("u1", "How are you?").await.unwrap();
    let mid = h.manager.continue_reply("u1").await.unwrap();
    assert!(mid.truncated && mid.continued);
    let done = h.manager.submit_turn("u1", "go on").await.unwrap();

    assert!(!done.truncated);
    assert_eq!(done.text, "Well... it is... complicated.");
    let s = h.manager.session("u1");
    assert_eq!(s.transcript.len(), 1);
    assert_eq!(s.transcript[0].therapist, "How are you?");
}

#[tokio::test]
async fn explicit_continue_without_pending_is_refused() {
    let h = harness();
    started(&h, "u1").await;
    let err = h.manager.continue_reply("u1").await.unwrap_err();
    assert!(matches!(err, SessionError::NothingToContinue));
    assert!(h.patient.requests().is_empty());
}

#[tokio::test]
async fn failed_continuation_leaves_it_pending() {
    let h = harness();
    started(&h, "u1").await;
    h.patient.push_truncated("It started when");
    h.patient.push_error(Error::Timeout("slow".into()));
    h.patient.push_reply(" I moved.");

    h.manager.submit_turn("u1", "Tell me").await.unwrap();
    let before = h.manager.session("u1");

    let err = h.manager.submit_turn("u1", "continue").await.unwrap_err();
    assert!(matches!(err, SessionError::Generation(_)));
    assert!(err.is_retryable());
    assert_eq!(h.manager.session("u1"), before);

    h.manager.submit_turn("u1", "continue").await.unwrap();
    assert_eq!(
        h.manager.session("u1").transcript[0].patient,
        "It started when... I moved."
    );
}

#[tokio::test]
async fn provider_error_on_a_fresh_turn_changes_nothing() {
    let h = harness();
    started(&h, "u1").await;
    h.patient.push_error(Error::Provider {
        provider: "patient".into(),
        message: "HTTP 529".into(),
    });
    let before = h.manager.session("u1");
    let writes = h.backend.write_count();

    assert!(h.manager.submit_turn("u1", "Hello").await.is_err());
    assert_eq!(h.manager.session("u1"), before);
    assert_eq!(h.backend.write_count(), writes);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Start / end
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn turn_without_session_is_refused() {
    let h = harness();
    let err = h.manager.submit_turn("u1", "hi").await.unwrap_err();
    assert!(matches!(err, SessionError::NoActiveSession));
    assert!(matches!(h.manager.info("u1"), Err(SessionError::NoActiveSession)));
}

#[tokio::test]
async fn replacing_an_active_dialog_needs_confirmation() {
    let h = harness();
    started(&h, "u1").await;
    h.patient.push_reply("Hi.");
    h.manager.submit_turn("u1", "Hello").await.unwrap();

    let mut other = anna();
    other.name = "Boris".into();
    let out = h.manager.start_session("u1", other.clone(), false).await.unwrap();
    assert!(matches!(out, StartOutcome::ConfirmationRequired { ref active } if active.starts_with("Anna")));
    assert_eq!(h.manager.session("u1").transcript.len(), 1);

    let out = h.manager.start_session("u1", other, true).await.unwrap();
    assert!(matches!(out, StartOutcome::Started { replaced: true, .. }));
    let s = h.manager.session("u1");
    assert_eq!(s.active_profile.unwrap().name, "Boris");
    assert!(s.transcript.is_empty());
    assert!(s.pending.is_none());
}

#[tokio::test]
async fn end_session_counts_archives_and_goes_idle() {
    let h = harness();
    two_exchanges_with_continuation(&h, "u1").await;

    let report = h.manager.end_session("u1").await.unwrap();
    assert_eq!(report.exchanges, 2);
    assert_eq!(report.stats.total_sessions, 1);
    assert_eq!(report.stats.total_exchanges, 2);
    assert_eq!(report.stats.sessions_by_category["anxiety"], 1);
    let archived = report.archived.expect("dialog archived");
    assert!(archived.path.exists());
    assert!(report.profile.id.is_some());

    let s = h.manager.session("u1");
    assert_eq!(s.status, SessionStatus::Idle);
    assert!(s.active_profile.is_none());
    assert!(s.transcript.is_empty());
    let completed = s.last_completed.as_ref().expect("snapshot kept");
    assert_eq!(completed.transcript.len(), 2);
    assert_eq!(completed.profile.id, report.profile.id);
    assert!(s.check_invariants().is_ok());
}

#[tokio::test]
async fn second_end_is_a_no_op() {
    let h = harness();
    two_exchanges_with_continuation(&h, "u1").await;
    h.manager.end_session("u1").await.unwrap();
    let stats = h.manager.stats("u1").stats;

    let err = h.manager.end_session("u1").await.unwrap_err();
    assert!(matches!(err, SessionError::NoActiveSession));
    assert_eq!(h.manager.stats("u1").stats, stats);
}

#[tokio::test]
async fn ending_an_empty_dialog_counts_but_archives_nothing() {
    let h = harness();
    started(&h, "u1").await;
    let report = h.manager.end_session("u1").await.unwrap();
    assert!(report.archived.is_none());
    assert_eq!(report.stats.total_sessions, 1);
    assert_eq!(report.stats.total_exchanges, 0);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Analysis
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn ended_dialog_can_be_analyzed_once() {
    let h = harness();
    two_exchanges_with_continuation(&h, "u1").await;
    h.manager.end_session("u1").await.unwrap();
    h.analyst.push_reply("1. Anxiety at work. 2. Tense.");

    let report = h.manager.request_analysis("u1").await.unwrap();
    assert!(report.from_completed);
    assert_eq!(report.exchanges, 2);
    let prompt = &h.analyst.last_request().unwrap().messages[0].content;
    assert!(prompt.contains("[2] Patient: It started three months ago when... my job changed."));
    assert_eq!(h.analyst.last_request().unwrap().max_tokens, 500);

    let s = h.manager.session("u1");
    assert_eq!(s.last_analysis.as_deref(), Some("1. Anxiety at work. 2. Tense."));
    assert!(s.last_completed.unwrap().analyzed);

    let err = h.manager.request_analysis("u1").await.unwrap_err();
    assert!(matches!(err, SessionError::NothingToAnalyze));
}

#[tokio::test]
async fn analysis_needs_something_to_analyze() {
    let h = harness();
    assert!(matches!(
        h.manager.request_analysis("u1").await.unwrap_err(),
        SessionError::NoActiveSession
    ));
    started(&h, "u1").await;
    assert!(matches!(
        h.manager.request_analysis("u1").await.unwrap_err(),
        SessionError::NothingToAnalyze
    ));
    assert!(h.analyst.requests().is_empty());
}

#[tokio::test]
async fn reply_awaiting_continuation_is_not_analyzed() {
    let h = harness();
    started(&h, "u1").await;
    h.patient.push_truncated("It started when");
    h.manager.submit_turn("u1", "Hello").await.unwrap();

    let err = h.manager.request_analysis("u1").await.unwrap_err();
    assert!(matches!(err, SessionError::NothingToAnalyze));
    assert!(h.analyst.requests().is_empty());
    assert!(h.manager.session("u1").pending.is_some());

    h.patient.push_reply(" I moved.");
    h.manager.continue_reply("u1").await.unwrap();
    h.patient.push_truncated("Then my");
    h.manager.submit_turn("u1", "And then?").await.unwrap();
    h.analyst.push_reply("Keep going.");

    let report = h.manager.request_analysis("u1").await.unwrap();
    assert_eq!(report.exchanges, 1);
    let prompt = &h.analyst.last_request().unwrap().messages[0].content;
    assert!(prompt.contains("It started when... I moved."));
    assert!(!prompt.contains("Then my"));
}

#[tokio::test]
async fn active_analysis_is_kept_and_archived_on_end() {
    let h = harness();
    started(&h, "u1").await;
    h.patient.push_reply("Hi.");
    h.manager.submit_turn("u1", "Hello").await.unwrap();
    h.analyst.push_reply("Good rapport.");

    let report = h.manager.request_analysis("u1").await.unwrap();
    assert!(!report.from_completed);
    let s = h.manager.session("u1");
    assert_eq!(s.analysis_history.len(), 1);
    assert_eq!(s.status, SessionStatus::InDialog);

    let end = h.manager.end_session("u1").await.unwrap();
    assert_eq!(end.analysis.as_deref(), Some("Good rapport."));
}

#[tokio::test]
async fn analysis_after_end_leaves_the_archive_untouched() {
    let h = harness();
    two_exchanges_with_continuation(&h, "u1").await;
    let end = h.manager.end_session("u1").await.unwrap();
    let profile_id = end.profile.id.clone().unwrap();
    h.analyst.push_reply("Late feedback.");
    h.manager.request_analysis("u1").await.unwrap();

    // The record was written without an analysis and is never rewritten.
    let history = Archive::new(h._dir.path())
        .load_history("u1", &profile_id)
        .unwrap();
    assert!(history.is_empty());
    let completed = h.manager.session("u1").last_completed.unwrap();
    assert_eq!(completed.analysis.as_deref(), Some("Late feedback."));
}

#[tokio::test]
async fn failed_analysis_keeps_the_one_shot_available() {
    let h = harness();
    two_exchanges_with_continuation(&h, "u1").await;
    h.manager.end_session("u1").await.unwrap();
    h.analyst.push_error(Error::Http("connection reset".into()));
    h.analyst.push_reply("Recovered.");

    assert!(h.manager.request_analysis("u1").await.is_err());
    assert!(!h.manager.session("u1").last_completed.unwrap().analyzed);
    assert_eq!(h.manager.request_analysis("u1").await.unwrap().text, "Recovered.");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Isolation and persistence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn users_never_touch_each_other() {
    let h = harness();
    started(&h, "alice").await;
    h.patient.push_reply("I'm Anna.");
    h.manager.submit_turn("alice", "Hello").await.unwrap();
    let bob_before = h.manager.session("bob");

    h.manager.end_session("alice").await.unwrap();
    assert_eq!(h.manager.session("bob"), bob_before);

    started(&h, "bob").await;
    h.patient.push_truncated("Uh");
    h.manager.submit_turn("bob", "Hi").await.unwrap();
    let alice = h.manager.session("alice");
    assert_eq!(alice.status, SessionStatus::Idle);
    assert_eq!(alice.stats.total_sessions, 1);
    assert!(alice.pending.is_none());
    assert_eq!(h.manager.session("bob").stats.total_sessions, 0);
}

#[tokio::test]
async fn concurrent_turns_for_one_user_are_serialized() {
    let h = Arc::new(harness());
    started(&h, "u1").await;
    h.patient.push_truncated("It started");
    h.patient.push_reply(" last spring.");
    h.patient.hold();

    let a = {
        let h = h.clone();
        tokio::spawn(async move { h.manager.submit_turn("u1", "Tell me").await })
    };
    let b = {
        let h = h.clone();
        tokio::spawn(async move { h.manager.submit_turn("u1", "And then?").await })
    };

    // Let both tasks run as far as they can while the first call is parked.
    while h.patient.in_flight() == 0 {
        tokio::task::yield_now().await;
    }
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.patient.requests().len(), 1);
    assert_eq!(h.patient.in_flight(), 1);

    h.patient.release(2);
    let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
    assert!(ra.is_ok() && rb.is_ok());
    assert_eq!(h.patient.requests().len(), 2);
    assert_eq!(h.patient.max_in_flight(), 1);

    // Whichever ran second saw the pending flag and continued instead of
    // appending a second exchange.
    let s = h.manager.session("u1");
    assert_eq!(s.transcript.len(), 1);
    assert_eq!(s.transcript[0].patient, "It started... last spring.");
    assert!(s.pending.is_none());
}

#[tokio::test]
async fn persistence_failure_does_not_block_the_dialog() {
    let h = harness();
    started(&h, "u1").await;
    h.backend.set_failing(true);
    h.patient.push_reply("Still here.");

    let reply = h.manager.submit_turn("u1", "Hello").await.unwrap();
    assert_eq!(reply.text, "Still here.");
    assert_eq!(h.manager.session("u1").transcript.len(), 1);
    assert!(h.backend.saved("u1").unwrap().transcript.is_empty());

    h.backend.set_failing(false);
    h.manager.flush().unwrap();
    assert_eq!(h.backend.saved("u1").unwrap().transcript.len(), 1);
}

#[tokio::test]
async fn stats_report_level_and_average() {
    let h = harness();
    for _ in 0..5 {
        started(&h, "u1").await;
        h.patient.push_reply("ok");
        h.manager.submit_turn("u1", "hi").await.unwrap();
        h.manager.end_session("u1").await.unwrap();
    }
    let report = h.manager.stats("u1");
    assert_eq!(report.stats.total_sessions, 5);
    assert_eq!(report.level.as_str(), "Trainee");
    assert!((report.average_exchanges - 1.0).abs() < 1e-9);
    assert!(h.manager.last_session_time("u1").is_some());
}
