//! Profile generator.
//!
//! Picks the case parameters (random where the caller left them open), asks
//! the generator role for one JSON object, and stamps the result with its
//! generation metadata.

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

use pt_domain::error::{Error, Result};
use pt_domain::profile::{Profile, ProfileMeta};
use pt_domain::taxonomy::{self, Category, Complexity, Openness, CATEGORIES};
use pt_providers::{CacheAwareClient, Instructions};

use crate::error::SessionError;
use crate::prompt::{excerpt, generator_request, GENERATOR_SYSTEM};

/// Case parameters. `None` means "pick one at random".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileRequest {
    pub category: Option<String>,
    pub openness: Option<Openness>,
    pub complexity: Option<Complexity>,
}

/// Fully resolved parameters for one generation.
#[derive(Debug, Clone, Copy)]
struct CaseSpec {
    category: &'static Category,
    diagnosis: &'static str,
    openness: Openness,
    complexity: Complexity,
}

/// The narrative part of a profile as the model returns it.
#[derive(Debug, Deserialize)]
struct GeneratedProfile {
    name: String,
    age: u32,
    #[serde(default)]
    gender: String,
    #[serde(default)]
    profession: String,
    problem: String,
    #[serde(default)]
    symptoms: Vec<String>,
    #[serde(default)]
    motivation: String,
    #[serde(default)]
    openness: String,
    #[serde(default)]
    history: String,
    #[serde(default)]
    triggers: Vec<String>,
    #[serde(default)]
    coping: Vec<String>,
    #[serde(default)]
    defenses: Vec<String>,
    #[serde(default)]
    speech: String,
    #[serde(default)]
    resistance: String,
    #[serde(default)]
    background: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ProfileGenerator {
    client: CacheAwareClient,
    max_tokens: u32,
}

impl ProfileGenerator {
    pub fn new(client: CacheAwareClient, max_tokens: u32) -> Self {
        Self { client, max_tokens }
    }

    pub async fn generate(&self, req: ProfileRequest) -> std::result::Result<Profile, SessionError> {
        let spec = resolve(&req)?;
        tracing::info!(
            category = spec.category.key,
            diagnosis = spec.diagnosis,
            openness = %spec.openness,
            complexity = %spec.complexity,
            "generating profile"
        );

        let prompt = generator_request(spec.category, spec.diagnosis, spec.openness, spec.complexity);
        let completion = self
            .client
            .complete(&Instructions::from(GENERATOR_SYSTEM), &[], &prompt, self.max_tokens)
            .await
            .map_err(SessionError::Generation)?;

        let generated = parse_generated(&completion.text).map_err(|e| {
            tracing::warn!(error = %e, "generator output could not be parsed");
            SessionError::Generation(e)
        })?;

        Ok(Profile {
            id: None,
            name: generated.name,
            age: generated.age,
            gender: generated.gender,
            profession: generated.profession,
            problem: generated.problem,
            symptoms: generated.symptoms,
            motivation: generated.motivation,
            attitude: generated.openness,
            history: generated.history,
            triggers: generated.triggers,
            coping: generated.coping,
            defenses: generated.defenses,
            speech: generated.speech,
            resistance: generated.resistance,
            background: generated.background,
            meta: ProfileMeta {
                category: spec.category.key.to_owned(),
                category_name: spec.category.name.to_owned(),
                diagnosis: spec.diagnosis.to_owned(),
                complexity: spec.complexity,
                openness: spec.openness,
                created_at: Utc::now(),
                token_usage: Some(completion.usage),
            },
            saved_at: None,
        })
    }
}

/// Fill in missing parameters. Kept synchronous so the thread-local RNG is
/// never held across an await.
fn resolve(req: &ProfileRequest) -> std::result::Result<CaseSpec, SessionError> {
    let mut rng = rand::thread_rng();

    let category = match &req.category {
        Some(key) => taxonomy::category(key)
            .ok_or_else(|| SessionError::InvalidProfile(format!("unknown category '{key}'")))?,
        None => CATEGORIES
            .choose(&mut rng)
            .ok_or_else(|| SessionError::InvalidProfile("no categories defined".into()))?,
    };
    let diagnosis = category.cases.choose(&mut rng).copied().ok_or_else(|| {
        SessionError::InvalidProfile(format!("category '{}' has no cases", category.key))
    })?;
    let openness = match req.openness {
        Some(o) => o,
        None => Openness::ALL[rng.gen_range(0..Openness::ALL.len())],
    };
    let complexity = match req.complexity {
        Some(c) => c,
        None => Complexity::new(rng.gen_range(Complexity::MIN..=Complexity::MAX))
            .ok_or_else(|| SessionError::InvalidProfile("complexity out of range".into()))?,
    };

    Ok(CaseSpec {
        category,
        diagnosis,
        openness,
        complexity,
    })
}

/// Strict parse first; then, once, the span from the first `{` to the last
/// `}`. Anything else is an unparseable generation.
fn parse_generated(raw: &str) -> Result<GeneratedProfile> {
    if let Ok(p) = serde_json::from_str(raw.trim()) {
        return Ok(p);
    }
    let span = raw
        .find('{')
        .zip(raw.rfind('}'))
        .filter(|(start, end)| start < end)
        .map(|(start, end)| &raw[start..=end]);
    match span {
        Some(json) => serde_json::from_str(json)
            .map_err(|e| Error::Parse(format!("{e}; output began: {}", excerpt(raw, 120)))),
        None => Err(Error::Parse(format!(
            "no JSON object in output: {}",
            excerpt(raw, 120)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pt_domain::config::CacheConfig;
    use pt_providers::scripted::ScriptedProvider;
    use pt_providers::{CacheLedger, RoleBinding};
    use std::sync::Arc;

    const ANNA: &str = r#"{"name":"Anna","age":34,"gender":"female","profession":"accountant",
        "problem":"I panic before reports","symptoms":["insomnia"],"motivation":"sister",
        "openness":"doubtful","history":"h","triggers":["t"],"coping":["c"],
        "defenses":["d"],"speech":"s","resistance":"r","background":"b"}"#;

    fn generator(provider: Arc<ScriptedProvider>) -> ProfileGenerator {
        let binding = RoleBinding {
            provider,
            model: None,
            temperature: None,
        };
        let client = CacheAwareClient::new(
            "generator",
            binding,
            CacheConfig::default(),
            Arc::new(CacheLedger::new(0.9)),
        );
        ProfileGenerator::new(client, 1000)
    }

    #[test]
    fn strict_json_parses() {
        let p = parse_generated(ANNA).unwrap();
        assert_eq!(p.name, "Anna");
        assert_eq!(p.openness, "doubtful");
    }

    #[test]
    fn fenced_or_wrapped_json_parses_leniently() {
        let fenced = format!("```json\n{ANNA}\n```");
        assert_eq!(parse_generated(&fenced).unwrap().age, 34);
        let chatty = format!("Here is the patient:\n{ANNA}\nHope this helps!");
        assert_eq!(parse_generated(&chatty).unwrap().age, 34);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse_generated("no json here"), Err(Error::Parse(_))));
        assert!(matches!(parse_generated("} backwards {"), Err(Error::Parse(_))));
        assert!(matches!(parse_generated("{\"name\": 5"), Err(Error::Parse(_))));
    }

    #[test]
    fn resolve_honours_given_parameters() {
        let req = ProfileRequest {
            category: Some("trauma".into()),
            openness: Some(Openness::Resistant),
            complexity: Complexity::new(2),
        };
        let spec = resolve(&req).unwrap();
        assert_eq!(spec.category.key, "trauma");
        assert!(spec.category.cases.contains(&spec.diagnosis));
        assert_eq!(spec.openness, Openness::Resistant);
        assert_eq!(spec.complexity.level(), 2);
    }

    #[test]
    fn resolve_randomizes_missing_parameters_within_range() {
        for _ in 0..50 {
            let spec = resolve(&ProfileRequest::default()).unwrap();
            assert!(taxonomy::category(spec.category.key).is_some());
            assert!((1..=5).contains(&spec.complexity.level()));
        }
    }

    #[tokio::test]
    async fn unknown_category_fails_before_any_call() {
        let provider = Arc::new(ScriptedProvider::new("gen"));
        let g = generator(provider.clone());
        let err = g
            .generate(ProfileRequest {
                category: Some("astrology".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidProfile(_)));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn generated_profile_is_stamped_with_meta() {
        let provider = Arc::new(ScriptedProvider::new("gen"));
        provider.push_reply(ANNA);
        let g = generator(provider.clone());
        let p = g
            .generate(ProfileRequest {
                category: Some("anxiety".into()),
                openness: Some(Openness::Ambivalent),
                complexity: Complexity::new(3),
            })
            .await
            .unwrap();

        assert_eq!(p.name, "Anna");
        assert_eq!(p.attitude, "doubtful");
        assert_eq!(p.meta.category, "anxiety");
        assert_eq!(p.meta.openness, Openness::Ambivalent);
        assert!(p.meta.token_usage.is_some());
        assert!(p.id.is_none());
        assert_eq!(provider.requests()[0].max_tokens, 1000);
    }

    #[tokio::test]
    async fn unparseable_output_is_a_retryable_generation_error() {
        let provider = Arc::new(ScriptedProvider::new("gen"));
        provider.push_reply("Sorry, I can't help with that.");
        let err = generator(provider)
            .generate(ProfileRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Generation(Error::Parse(_))));
        assert!(err.is_retryable());
    }
}
