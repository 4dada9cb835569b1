use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt cache
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Master switch for cache tagging. Metrics are collected either way.
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Instructions must be strictly longer than this (in characters) to be
    /// tagged; shorter prefixes fall under the provider's cacheable minimum.
    #[serde(default = "d_1000")]
    pub min_cacheable_chars: usize,
    /// Fraction of each cache-read token counted as saved. An estimate,
    /// not billing truth.
    #[serde(default = "d_ratio")]
    pub savings_ratio: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_cacheable_chars: d_1000(),
            savings_ratio: d_ratio(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_1000() -> usize {
    1000
}
fn d_ratio() -> f64 {
    0.9
}
