//! Truncated replies and their continuation.
//!
//! A reply that hit the output ceiling is stored as a transcript entry right
//! away and marked pending by index. The next turn asks the model to carry
//! on, and the fragment is merged into that same entry. A continuation that
//! is itself cut off keeps the entry pending, so chains of any length end up
//! as one entry.

use pt_domain::message::Message;

use crate::model::{Exchange, PendingContinuation, Session};

/// Separator between a partial reply and its continuation.
pub const ELLIPSIS: &str = "...";

/// Whether `text` already ends with an ellipsis (ASCII or the single glyph).
pub fn ends_with_ellipsis(text: &str) -> bool {
    let t = text.trim_end();
    t.ends_with(ELLIPSIS) || t.ends_with('…')
}

/// Join a partial reply and the fragment that continues it.
///
/// The separator is omitted when the partial already trails off with an
/// ellipsis, so `"when..."` + `" my job changed."` reads
/// `"when... my job changed."`.
pub fn merge(partial: &str, fragment: &str) -> String {
    if ends_with_ellipsis(partial) {
        format!("{partial}{fragment}")
    } else {
        format!("{partial}{ELLIPSIS}{fragment}")
    }
}

/// What the user sees for a cut-off reply: the partial text, an ellipsis,
/// and the hint explaining how to hear the rest.
pub fn present_truncated(partial: &str, hint: &str) -> String {
    let mut out = partial.to_owned();
    if !ends_with_ellipsis(partial) {
        out.push_str(ELLIPSIS);
    }
    if !hint.is_empty() {
        out.push_str("\n\n");
        out.push_str(hint);
    }
    out
}

// ── Message layout ─────────────────────────────────────────────────

/// Replay a transcript as alternating user/assistant messages.
pub fn history_messages(transcript: &[Exchange]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(transcript.len() * 2);
    for ex in transcript {
        messages.push(Message::user(ex.therapist.as_str()));
        messages.push(Message::assistant(ex.patient.as_str()));
    }
    messages
}

/// History for a continuation request: every exchange up to and including
/// the pending one, whose partial answer is the last assistant message. The
/// caller sends the continue prompt as the new turn.
pub fn continuation_history(transcript: &[Exchange], pending: PendingContinuation) -> Vec<Message> {
    let end = (pending.index + 1).min(transcript.len());
    history_messages(&transcript[..end])
}

// ── Transitions ────────────────────────────────────────────────────

/// Result of folding a completion into the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// The stored patient text for the affected entry.
    pub patient: String,
    /// 1-based position of the affected entry.
    pub exchange: usize,
    /// The entry is still waiting for more text.
    pub pending: bool,
}

/// Append a fresh exchange. Marks it pending when the reply was cut off.
pub fn record_reply(session: &mut Session, therapist: &str, reply: &str, truncated: bool) -> Applied {
    session.transcript.push(Exchange::new(therapist, reply));
    let index = session.transcript.len() - 1;
    session.pending = truncated.then_some(PendingContinuation { index });
    Applied {
        patient: reply.to_owned(),
        exchange: index + 1,
        pending: truncated,
    }
}

/// Merge a continuation fragment into the pending entry, in place.
///
/// Returns `None` when nothing is pending or the marker no longer points at
/// an entry.
pub fn apply_continuation(session: &mut Session, fragment: &str, truncated: bool) -> Option<Applied> {
    let pending = session.pending?;
    let entry = session.transcript.get_mut(pending.index)?;
    entry.patient = merge(&entry.patient, fragment);
    let patient = entry.patient.clone();
    session.pending = truncated.then_some(pending);
    Some(Applied {
        patient,
        exchange: pending.index + 1,
        pending: truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionStatus;
    use pt_domain::message::Role;

    fn in_dialog() -> Session {
        let mut s = Session::new("u1");
        s.status = SessionStatus::InDialog;
        s
    }

    #[test]
    fn merge_skips_separator_after_trailing_ellipsis() {
        assert_eq!(
            merge("It started three months ago when...", " my job changed."),
            "It started three months ago when... my job changed."
        );
        assert_eq!(merge("I was…", " tired."), "I was… tired.");
    }

    #[test]
    fn merge_inserts_separator_otherwise() {
        assert_eq!(merge("I just", " can't sleep."), "I just... can't sleep.");
    }

    #[test]
    fn truncated_presentation_adds_ellipsis_and_hint() {
        let shown = present_truncated("I just", "(send /continue)");
        assert_eq!(shown, "I just...\n\n(send /continue)");
        let shown = present_truncated("when...", "(hint)");
        assert!(shown.starts_with("when...\n\n"));
        assert!(!shown.contains("......"));
    }

    #[test]
    fn truncated_reply_is_stored_and_marked_pending() {
        let mut s = in_dialog();
        record_reply(&mut s, "Hello", "Hi.", false);
        let applied = record_reply(&mut s, "Tell me more", "It started when...", true);

        assert_eq!(applied.exchange, 2);
        assert!(applied.pending);
        assert_eq!(s.transcript.len(), 2);
        assert_eq!(s.transcript[1].patient, "It started when...");
        assert_eq!(s.pending, Some(PendingContinuation { index: 1 }));
    }

    #[test]
    fn chained_continuations_stay_in_one_entry() {
        let mut s = in_dialog();
        record_reply(&mut s, "Tell me more", "It began", true);
        let a = apply_continuation(&mut s, " slowly", true).unwrap();
        assert!(a.pending);
        let b = apply_continuation(&mut s, " and then stopped.", false).unwrap();

        assert!(!b.pending);
        assert_eq!(s.transcript.len(), 1);
        assert_eq!(s.transcript[0].patient, "It began... slowly... and then stopped.");
        assert!(s.pending.is_none());
        assert_eq!(s.completed_exchanges().len(), 1);
    }

    #[test]
    fn continuation_without_pending_is_refused() {
        let mut s = in_dialog();
        record_reply(&mut s, "Hello", "Hi.", false);
        assert!(apply_continuation(&mut s, "more", false).is_none());
        assert_eq!(s.transcript[0].patient, "Hi.");
    }

    #[test]
    fn continuation_history_ends_with_the_partial_answer() {
        let transcript = vec![
            Exchange::new("Hello", "Hi."),
            Exchange::new("Tell me more", "It started when..."),
        ];
        let msgs = continuation_history(&transcript, PendingContinuation { index: 1 });
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[2], Message::user("Tell me more"));
        assert_eq!(msgs[3].role, Role::Assistant);
        assert_eq!(msgs[3].content, "It started when...");
    }
}
