use serde::{Deserialize, Serialize};

/// Token accounting for a single completion, including prompt-cache fields.
///
/// Providers that do not report cache activity leave the cache fields at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    /// Tokens written to the provider's prompt cache by this call.
    #[serde(default)]
    pub cache_creation_input_tokens: u32,
    /// Tokens served from the provider's prompt cache by this call.
    #[serde(default)]
    pub cache_read_input_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// Component-wise sum, used when a reply spans several calls.
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_input_tokens += other.cache_creation_input_tokens;
        self.cache_read_input_tokens += other.cache_read_input_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cache_fields_default_to_zero() {
        let u: Usage = serde_json::from_str(r#"{"input_tokens":12,"output_tokens":3}"#).unwrap();
        assert_eq!(u.cache_creation_input_tokens, 0);
        assert_eq!(u.cache_read_input_tokens, 0);
        assert_eq!(u.total(), 15);
    }

    #[test]
    fn add_sums_every_field() {
        let mut a = Usage {
            input_tokens: 10,
            output_tokens: 5,
            cache_creation_input_tokens: 100,
            cache_read_input_tokens: 0,
        };
        a.add(&Usage {
            input_tokens: 1,
            output_tokens: 2,
            cache_creation_input_tokens: 0,
            cache_read_input_tokens: 100,
        });
        assert_eq!(a.input_tokens, 11);
        assert_eq!(a.output_tokens, 7);
        assert_eq!(a.cache_creation_input_tokens, 100);
        assert_eq!(a.cache_read_input_tokens, 100);
    }
}
