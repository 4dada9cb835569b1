//! Prompt builders for the three model roles.

use std::fmt::Write as _;

use pt_domain::profile::Profile;
use pt_domain::taxonomy::{Category, Complexity, Openness};
use pt_providers::Instructions;

use crate::archive::ArchivedSession;
use crate::model::Exchange;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Patient
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Role-play instructions for a profile. Stable for the life of the
/// dialog, so long ones are served from the prompt cache.
pub fn patient_instructions(p: &Profile) -> Instructions {
    let mut s = String::with_capacity(2048);
    let _ = writeln!(
        s,
        "You are a patient with {}. Your attitude toward therapy: {}.",
        p.meta.diagnosis, p.attitude
    );
    s.push('\n');
    s.push_str("In your first reply to the psychologist:\n");
    let _ = writeln!(
        s,
        "1. Introduce yourself ({}, {} years old, {})",
        p.name, p.age, p.profession
    );
    let _ = writeln!(
        s,
        "2. Briefly describe one concrete situation connected to \"{}\"",
        p.problem
    );
    let _ = writeln!(
        s,
        "3. Mention 1-2 symptoms from this list: {}",
        p.symptoms.join(", ")
    );
    s.push('\n');
    s.push_str("Your traits:\n");
    let _ = writeln!(s, "- Motivation: {}", p.motivation);
    let _ = writeln!(s, "- Attitude toward therapy: {}", p.attitude);
    let _ = writeln!(s, "- History of the problem: {}", p.history);
    let _ = writeln!(s, "- Psychological defenses: {}", p.defenses.join(", "));
    let _ = writeln!(s, "- Triggers: {}", p.triggers.join(", "));
    let _ = writeln!(s, "- Coping strategies: {}", p.coping.join(", "));
    let _ = writeln!(s, "- Family background: {}", p.background);
    s.push('\n');
    s.push_str("During the dialog:\n");
    s.push_str("- Answer BRIEFLY (2-4 sentences at most)\n");
    s.push_str("- Speak haltingly, with pauses (*show actions in asterisks*)\n");
    s.push_str("- Wait for the psychologist's reaction; do not reveal everything at once\n");
    let _ = writeln!(s, "- Use your speech style: {}", p.speech);
    let _ = writeln!(s, "- Show resistance like this: {}", p.resistance);
    s.push_str("- Do NOT use psychological terminology; speak in everyday language\n");
    s.push_str("- Stay consistent with your story throughout the dialog\n");
    s.push_str("- Do NOT deliver long monologues\n");
    s.push_str("- Sometimes ask the psychologist questions back\n");
    s.push('\n');
    s.push_str(
        "Be a living person, not a model patient. The goal is a realistic dialog, \
         not handing over all the information at once.",
    );
    Instructions::Text(s)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Analyst
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const ANALYST_SYSTEM: &str = "You are an experienced clinical supervisor reviewing a \
trainee psychologist's session with a simulated patient. Be brief, concrete and practical.";

/// The most recent `limit` qualifying sessions, oldest first.
pub fn recent_sessions(history: &[ArchivedSession], limit: usize) -> &[ArchivedSession] {
    let start = history.len().saturating_sub(limit);
    &history[start..]
}

/// The review request for one dialog, with a short digest of earlier
/// sessions for the same patient when there are any.
pub fn analysis_request(
    p: &Profile,
    transcript: &[Exchange],
    history: &[ArchivedSession],
    history_limit: usize,
    excerpt_chars: usize,
) -> String {
    let mut s = String::with_capacity(1024 + transcript.len() * 200);
    s.push_str("Analyze this psychotherapy session and give feedback to the therapist.\n\n");

    s.push_str("PATIENT INFORMATION:\n");
    let _ = writeln!(s, "- Name: {}, {} years old", p.name, p.age);
    let _ = writeln!(s, "- Diagnosis: {}", p.meta.diagnosis);
    let _ = writeln!(s, "- Openness: {}", p.attitude);
    let _ = writeln!(s, "- Symptoms: {}", p.symptoms.join(", "));
    s.push('\n');

    let recent = recent_sessions(history, history_limit);
    if !recent.is_empty() {
        s.push_str("RECENT SESSIONS WITH THIS PATIENT:\n");
        for past in recent {
            let analysis = past.analysis.as_deref().unwrap_or_default();
            let _ = writeln!(
                s,
                "- {} ({} exchanges): {}",
                past.archived_at.format("%Y-%m-%d %H:%M UTC"),
                past.transcript.len(),
                excerpt(analysis, excerpt_chars)
            );
        }
        s.push('\n');
    }

    s.push_str("DIALOG:\n");
    let dialog: Vec<String> = transcript
        .iter()
        .enumerate()
        .map(|(i, ex)| {
            format!(
                "[{n}] Therapist: {}\n[{n}] Patient: {}",
                ex.therapist,
                ex.patient,
                n = i + 1
            )
        })
        .collect();
    s.push_str(&dialog.join("\n\n"));
    s.push_str("\n\n");

    s.push_str("Give a short analysis covering:\n");
    s.push_str("1. Key themes and problems of the patient\n");
    s.push_str("2. The patient's emotional state during the session\n");
    s.push_str("3. Effective therapeutic interventions\n");
    s.push_str("4. What the therapist could improve\n");
    s.push_str("5. Recommendations for the next session\n");
    if !recent.is_empty() {
        s.push_str("Where relevant, note progress compared with the recent sessions.\n");
    }
    s.push('\n');
    s.push_str("Keep the analysis brief, concrete and practical.");
    s
}

/// At most `max` characters, with a trailing ellipsis when cut.
pub fn excerpt(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const GENERATOR_SYSTEM: &str = "You are a clinical psychology expert who writes realistic \
patient descriptions for training psychologists. Always answer with a single valid JSON object \
and nothing else: no prose, no markdown, no code fences.";

pub fn generator_request(
    category: &Category,
    diagnosis: &str,
    openness: Openness,
    complexity: Complexity,
) -> String {
    format!(
        r#"Create a detailed patient description for psychology training.

IMPORTANT: reply with ONLY a valid JSON object, without any extra text, explanation or markdown.

CASE PARAMETERS:
Diagnosis: {diagnosis}
Category: {category}
Openness: {openness} ({openness_desc})
Complexity: {complexity}

REQUIRED JSON FIELDS:
{{
  "name": "Patient's first name",
  "age": a number from 25 to 55,
  "gender": "male" or "female",
  "profession": "Profession",
  "problem": "The main problem as the patient sees it, 1-2 sentences",
  "symptoms": ["Symptom 1", "Symptom 2", "Symptom 3"],
  "motivation": "Why they came to a psychologist",
  "openness": "Attitude toward therapy, {openness}",
  "history": "Short history of how the problem developed",
  "triggers": ["Trigger 1", "Trigger 2"],
  "coping": ["Strategy 1", "Strategy 2"],
  "defenses": ["Defense 1", "Defense 2"],
  "speech": "Speech patterns and how emotions are expressed",
  "resistance": "How resistance shows up in therapy",
  "background": "Family and social background"
}}

Make it realistic and psychologically credible. Complexity {complexity} means {complexity_desc}.

IMPORTANT: return only the bare JSON object."#,
        category = category.name,
        openness = openness,
        openness_desc = openness.description(),
        complexity_desc = complexity.description(),
    )
}
