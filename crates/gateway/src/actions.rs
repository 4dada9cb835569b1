//! User actions and the slash-command syntax that produces them.
//!
//! The same [`Action`] values are built by the REPL (from typed lines) and by
//! the HTTP API (from request bodies), so both surfaces go through one
//! dispatcher.

use pt_domain::taxonomy::{self, Complexity, Openness};
use pt_sessions::ProfileRequest;

/// Something the trainee asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Generate a random patient and start a dialog.
    New,
    /// Generate a patient with chosen parameters.
    Custom {
        category: Option<String>,
        openness: Option<Openness>,
        complexity: Option<Complexity>,
    },
    /// Start a new dialog with a saved patient.
    Resume { profile_id: String },
    /// Repeat a start action, discarding the active dialog.
    Confirm(Box<Action>),
    /// A therapist line.
    Say(String),
    Continue,
    Analyze,
    End,
    Info,
    Stats,
    Patients,
    Feedback { rating: u8, comment: String },
}

impl Action {
    /// Whether this action may replace an active dialog and therefore needs
    /// confirmation.
    pub fn starts_session(&self) -> bool {
        matches!(
            self,
            Action::New | Action::Custom { .. } | Action::Resume { .. }
        )
    }

    /// Generator parameters for `New`/`Custom`.
    pub fn profile_request(&self) -> Option<ProfileRequest> {
        match self {
            Action::New => Some(ProfileRequest::default()),
            Action::Custom {
                category,
                openness,
                complexity,
            } => Some(ProfileRequest {
                category: category.clone(),
                openness: *openness,
                complexity: *complexity,
            }),
            _ => None,
        }
    }
}

/// One REPL line, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Action(Action),
    /// `/yes`: confirm whatever is waiting for confirmation.
    Confirm,
    Cache,
    Help,
    Exit,
    /// A malformed command, with a usage hint.
    Invalid(String),
    Unknown(String),
}

/// Classify one line of user input. Anything not starting with `/` is said
/// to the patient.
pub fn parse(line: &str) -> Input {
    let line = line.trim();
    if !line.starts_with('/') {
        return Input::Action(Action::Say(line.to_owned()));
    }

    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or_default().to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    match cmd.as_str() {
        "/new" | "/start" => Input::Action(Action::New),
        "/custom" => parse_custom(&args),
        "/resume" => match args.first() {
            Some(id) => Input::Action(Action::Resume {
                profile_id: (*id).to_owned(),
            }),
            None => Input::Invalid("Usage: /resume <profile_id> (see /patients)".into()),
        },
        "/continue" => Input::Action(Action::Continue),
        "/analyze" | "/analysis" => Input::Action(Action::Analyze),
        "/end" => Input::Action(Action::End),
        "/info" => Input::Action(Action::Info),
        "/stats" => Input::Action(Action::Stats),
        "/patients" => Input::Action(Action::Patients),
        "/feedback" => parse_feedback(&args),
        "/yes" => Input::Confirm,
        "/cache" => Input::Cache,
        "/help" => Input::Help,
        "/exit" | "/quit" => Input::Exit,
        _ => Input::Unknown(cmd),
    }
}

/// `/custom <category> [openness] [1-5]`, openness and complexity in either
/// order.
fn parse_custom(args: &[&str]) -> Input {
    let Some(category) = args.first() else {
        return Input::Invalid(format!(
            "Usage: /custom <category> [openness] [1-5]\nCategories: {}",
            category_keys()
        ));
    };
    if taxonomy::category(category).is_none() {
        return Input::Invalid(format!(
            "Unknown category '{category}'. Categories: {}",
            category_keys()
        ));
    }

    let mut openness = None;
    let mut complexity = None;
    for arg in &args[1..] {
        if let Ok(level) = arg.parse::<u8>() {
            match Complexity::new(level) {
                Some(c) => complexity = Some(c),
                None => return Input::Invalid("Complexity must be between 1 and 5.".into()),
            }
        } else if let Ok(o) = arg.parse::<Openness>() {
            openness = Some(o);
        } else {
            return Input::Invalid(format!(
                "Unknown openness '{arg}'. Use cooperative, ambivalent or resistant."
            ));
        }
    }

    Input::Action(Action::Custom {
        category: Some((*category).to_owned()),
        openness,
        complexity,
    })
}

/// `/feedback <1-5> [comment...]`
fn parse_feedback(args: &[&str]) -> Input {
    match args.first().map(|r| r.parse::<u8>()) {
        Some(Ok(rating)) => Input::Action(Action::Feedback {
            rating,
            comment: args[1..].join(" "),
        }),
        _ => Input::Invalid("Usage: /feedback <1-5> [comment]".into()),
    }
}

fn category_keys() -> String {
    taxonomy::CATEGORIES
        .iter()
        .map(|c| c.key)
        .collect::<Vec<_>>()
        .join(", ")
}

pub const HELP: &str = "\
Commands:
  /new                              Start a session with a random patient
  /custom <category> [openness] [1-5]
                                    Start a session with chosen parameters
  /patients                         List saved patients
  /resume <profile_id>              Start a new session with a saved patient
  /continue                         Hear the rest of a cut-off reply
  /analyze                          Supervisor feedback on the dialog
  /end                              End the session
  /info                             Show the patient card
  /stats                            Show your training statistics
  /feedback <1-5> [comment]         Rate the trainer
  /yes                              Confirm replacing the active session
  /cache                            Prompt cache statistics
  /exit                             Quit
Anything else is said to the patient.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_said_to_the_patient() {
        assert_eq!(
            parse("  How did you sleep?  "),
            Input::Action(Action::Say("How did you sleep?".into()))
        );
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse("/new"), Input::Action(Action::New));
        assert_eq!(parse("/CONTINUE"), Input::Action(Action::Continue));
        assert_eq!(parse("/analyze"), Input::Action(Action::Analyze));
        assert_eq!(parse("/end"), Input::Action(Action::End));
        assert_eq!(parse("/yes"), Input::Confirm);
        assert_eq!(parse("/cache"), Input::Cache);
        assert_eq!(parse("/quit"), Input::Exit);
        assert_eq!(parse("/dance"), Input::Unknown("/dance".into()));
    }

    #[test]
    fn custom_accepts_optional_parameters_in_any_order() {
        assert_eq!(
            parse("/custom trauma 4 resistant"),
            Input::Action(Action::Custom {
                category: Some("trauma".into()),
                openness: Some(Openness::Resistant),
                complexity: Complexity::new(4),
            })
        );
        assert_eq!(
            parse("/custom mood"),
            Input::Action(Action::Custom {
                category: Some("mood".into()),
                openness: None,
                complexity: None,
            })
        );
    }

    #[test]
    fn custom_rejects_bad_parameters() {
        assert!(matches!(parse("/custom"), Input::Invalid(_)));
        assert!(matches!(parse("/custom astrology"), Input::Invalid(_)));
        assert!(matches!(parse("/custom mood 9"), Input::Invalid(_)));
        assert!(matches!(parse("/custom mood sleepy"), Input::Invalid(_)));
    }

    #[test]
    fn resume_and_feedback_need_arguments() {
        assert!(matches!(parse("/resume"), Input::Invalid(_)));
        assert_eq!(
            parse("/resume abc-123"),
            Input::Action(Action::Resume {
                profile_id: "abc-123".into()
            })
        );
        assert!(matches!(parse("/feedback great"), Input::Invalid(_)));
        assert_eq!(
            parse("/feedback 5 very useful"),
            Input::Action(Action::Feedback {
                rating: 5,
                comment: "very useful".into()
            })
        );
    }

    #[test]
    fn only_start_actions_need_confirmation() {
        assert!(Action::New.starts_session());
        assert!(Action::Resume { profile_id: "x".into() }.starts_session());
        assert!(!Action::End.starts_session());
        assert!(!Action::Say("hi".into()).starts_session());
    }
}
