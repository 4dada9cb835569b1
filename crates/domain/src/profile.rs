use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::taxonomy::{Complexity, Openness};
use crate::usage::Usage;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Profile
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A simulated patient.
///
/// The narrative fields come from the generator and are never edited
/// afterwards. `id` and `saved_at` are filled in the first time the profile
/// is archived; reloading a saved profile produces an independent copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub age: u32,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub profession: String,
    /// The presenting problem as the patient sees it.
    pub problem: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub motivation: String,
    /// Free-text attitude toward therapy, written in the patient's voice.
    #[serde(rename = "openness", default)]
    pub attitude: String,
    #[serde(default)]
    pub history: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub coping: Vec<String>,
    #[serde(default)]
    pub defenses: Vec<String>,
    #[serde(default)]
    pub speech: String,
    #[serde(default)]
    pub resistance: String,
    #[serde(default)]
    pub background: String,
    pub meta: ProfileMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

/// Generation parameters stamped onto a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMeta {
    /// Category key from the taxonomy (e.g. `"anxiety"`).
    pub category: String,
    #[serde(default)]
    pub category_name: String,
    pub diagnosis: String,
    pub complexity: Complexity,
    pub openness: Openness,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<Usage>,
}

impl Profile {
    /// Short human label, e.g. `"Anna, 34: Panic disorder"`.
    pub fn label(&self) -> String {
        format!("{}, {}: {}", self.name, self.age, self.meta.diagnosis)
    }

    /// Whether this profile has been through archival at least once.
    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "name": "Anna",
            "age": 34,
            "gender": "female",
            "profession": "accountant",
            "problem": "I can't sleep before reports are due.",
            "symptoms": ["insomnia", "racing thoughts"],
            "motivation": "my sister insisted",
            "openness": "unsure this will help",
            "history": "started after a promotion",
            "triggers": ["deadlines"],
            "coping": ["overworking"],
            "defenses": ["rationalization"],
            "speech": "fast, hedging",
            "resistance": "changes the subject",
            "background": "eldest of three",
            "meta": {
                "category": "anxiety",
                "diagnosis": "Generalized anxiety disorder",
                "complexity": 3,
                "openness": "neutral"
            }
        }"#
    }

    #[test]
    fn parses_generator_shape_with_legacy_openness() {
        let p: Profile = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(p.attitude, "unsure this will help");
        assert_eq!(p.meta.openness, Openness::Ambivalent);
        assert_eq!(p.meta.complexity.level(), 3);
        assert!(p.id.is_none());
        assert!(!p.is_saved());
    }

    #[test]
    fn attitude_serializes_under_openness_key() {
        let p: Profile = serde_json::from_str(sample_json()).unwrap();
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["openness"], "unsure this will help");
        assert_eq!(v["meta"]["openness"], "ambivalent");
        assert!(v.get("id").is_none());
    }

    #[test]
    fn label_combines_name_age_diagnosis() {
        let p: Profile = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(p.label(), "Anna, 34: Generalized anxiety disorder");
    }
}
