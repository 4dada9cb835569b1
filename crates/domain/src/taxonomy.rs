//! Scenario taxonomy: diagnostic categories with their case labels, patient
//! openness dispositions, and the 1–5 complexity scale.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Categories
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A diagnostic category and the concrete cases it can produce.
#[derive(Debug, Clone, Copy)]
pub struct Category {
    pub key: &'static str,
    pub name: &'static str,
    pub cases: &'static [&'static str],
}

pub const CATEGORIES: &[Category] = &[
    Category {
        key: "anxiety",
        name: "Anxiety disorders",
        cases: &[
            "Generalized anxiety disorder",
            "Panic disorder",
            "Social anxiety",
            "Specific phobias",
        ],
    },
    Category {
        key: "mood",
        name: "Mood disorders",
        cases: &[
            "Depression (mild to moderate)",
            "Dysthymia (chronic depression)",
            "Seasonal depression",
            "Postpartum depression",
        ],
    },
    Category {
        key: "stress",
        name: "Stress and adjustment",
        cases: &[
            "Acute stress reaction",
            "Work burnout",
            "Grief (loss of a loved one)",
            "Divorce or breakup",
        ],
    },
    Category {
        key: "relationships",
        name: "Relationships and family",
        cases: &[
            "Family conflicts",
            "Relationship problems",
            "Codependency",
            "Parenting difficulties",
        ],
    },
    Category {
        key: "trauma",
        name: "Trauma",
        cases: &[
            "PTSD (combat, accidents)",
            "Childhood trauma or abuse",
            "Sexual violence",
            "Emotional abuse",
        ],
    },
    Category {
        key: "addictions",
        name: "Addictions",
        cases: &[
            "Alcohol dependence",
            "Drug dependence",
            "Gambling addiction",
            "Internet or social media addiction",
        ],
    },
    Category {
        key: "eating",
        name: "Eating disorders",
        cases: &["Anorexia", "Bulimia", "Binge eating"],
    },
    Category {
        key: "psychotic",
        name: "Psychotic disorders",
        cases: &[
            "First psychotic episode",
            "Schizophrenia",
            "Delusional disorder",
        ],
    },
    Category {
        key: "affective",
        name: "Severe affective disorders",
        cases: &[
            "Severe depression",
            "Bipolar disorder (mania)",
            "Mixed states",
        ],
    },
    Category {
        key: "crisis",
        name: "Crisis states",
        cases: &[
            "Suicidal ideation",
            "Parasuicide",
            "Aggression or threat of violence",
        ],
    },
    Category {
        key: "personality",
        name: "Personality disorders",
        cases: &[
            "Borderline personality disorder",
            "Narcissistic personality disorder",
            "Antisocial personality disorder",
        ],
    },
    Category {
        key: "youth",
        name: "Children and adolescents",
        cases: &[
            "School anxiety",
            "Low self-esteem",
            "Bullying",
            "Conduct problems",
        ],
    },
    Category {
        key: "elderly",
        name: "Older adults",
        cases: &[
            "Late-life depression",
            "Health anxiety",
            "Loneliness and isolation",
        ],
    },
    Category {
        key: "identity",
        name: "Identity issues",
        cases: &[
            "Gender dysphoria",
            "Questions of sexual orientation",
            "Cross-cultural adjustment",
            "Quarter-life or midlife crisis",
        ],
    },
    Category {
        key: "neurodiverse",
        name: "Neurodiversity",
        cases: &[
            "Adult ADHD",
            "Autism spectrum disorder",
            "Obsessive-compulsive disorder",
        ],
    },
];

/// Look up a category by its key (case-insensitive).
pub fn category(key: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|c| c.key.eq_ignore_ascii_case(key))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Openness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The patient's disposition toward therapy.
///
/// Older records used `open` / `neutral` / `closed`; those spellings are
/// accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Openness {
    #[serde(alias = "open")]
    Cooperative,
    #[serde(alias = "neutral")]
    Ambivalent,
    #[serde(alias = "closed")]
    Resistant,
}

impl Openness {
    pub const ALL: [Openness; 3] = [Openness::Cooperative, Openness::Ambivalent, Openness::Resistant];

    pub fn as_str(self) -> &'static str {
        match self {
            Openness::Cooperative => "cooperative",
            Openness::Ambivalent => "ambivalent",
            Openness::Resistant => "resistant",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Openness::Cooperative => {
                "aware of the problem, sought help on their own, ready to cooperate"
            }
            Openness::Ambivalent => "partly aware of the problem, ambivalent about change",
            Openness::Resistant => {
                "did not come voluntarily, denies or minimizes the problem"
            }
        }
    }

    pub fn resistance(self) -> &'static str {
        match self {
            Openness::Cooperative => "minimal, usually follows recommendations",
            Openness::Ambivalent => "moderate, alternates between resisting and cooperating",
            Openness::Resistant => "high, actively resists with defensive behaviour",
        }
    }

    pub fn motivation(self) -> &'static str {
        match self {
            Openness::Cooperative => "high, wants to solve the problem",
            Openness::Ambivalent => "medium, needs support to stay motivated",
            Openness::Resistant => "low and external, at the insistence of others",
        }
    }
}

impl fmt::Display for Openness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Openness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cooperative" | "open" => Ok(Openness::Cooperative),
            "ambivalent" | "neutral" => Ok(Openness::Ambivalent),
            "resistant" | "closed" => Ok(Openness::Resistant),
            other => Err(format!(
                "unknown openness '{other}' (expected cooperative, ambivalent or resistant)"
            )),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Complexity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Case complexity on an ordinal 1–5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Complexity(u8);

impl Complexity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(level: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&level).then_some(Self(level))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    pub fn description(self) -> &'static str {
        match self.0 {
            1 => "a typical, uncomplicated case that responds well to therapy",
            2 => "a standard case of moderate difficulty",
            4 => "a complex case with multiple problems or comorbid conditions",
            5 => "an especially complex case requiring an experienced specialist and possibly a combined treatment approach",
            _ => "a moderately complex case with some atypical presentations",
        }
    }
}

impl TryFrom<u8> for Complexity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Complexity::new(value)
            .ok_or_else(|| format!("complexity must be between 1 and 5, got {value}"))
    }
}

impl From<Complexity> for u8 {
    fn from(c: Complexity) -> u8 {
        c.0
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/5", self.0)
    }
}
