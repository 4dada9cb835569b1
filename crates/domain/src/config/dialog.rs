use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dialog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Generation limits and presentation knobs for a training dialog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogConfig {
    /// Output ceiling for each patient reply. Kept low so turns stay terse;
    /// replies that hit it go through the continuation protocol.
    #[serde(default = "d_200")]
    pub patient_max_tokens: u32,
    #[serde(default = "d_500")]
    pub analysis_max_tokens: u32,
    #[serde(default = "d_1000")]
    pub generator_max_tokens: u32,
    /// Simulated typing speed before a reply is shown.
    #[serde(default = "d_30")]
    pub typing_ms_per_char: u64,
    #[serde(default = "d_2000")]
    pub typing_cap_ms: u64,
    /// How many prior archived sessions feed the analyst.
    #[serde(default = "d_2")]
    pub history_sessions: usize,
    /// Character cap on each prior analysis excerpt.
    #[serde(default = "d_300")]
    pub history_excerpt_chars: usize,
    /// Shown after a truncated reply.
    #[serde(default = "d_hint")]
    pub continuation_hint: String,
    /// Sent to the model to resume a cut-off reply.
    #[serde(default = "d_continue_prompt")]
    pub continue_prompt: String,
    /// Suggested first question shown when a session starts.
    #[serde(default = "d_opening")]
    pub opening_question: String,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            patient_max_tokens: d_200(),
            analysis_max_tokens: d_500(),
            generator_max_tokens: d_1000(),
            typing_ms_per_char: d_30(),
            typing_cap_ms: d_2000(),
            history_sessions: d_2(),
            history_excerpt_chars: d_300(),
            continuation_hint: d_hint(),
            continue_prompt: d_continue_prompt(),
            opening_question: d_opening(),
        }
    }
}

impl DialogConfig {
    /// Artificial delay before surfacing a reply of `chars` characters.
    pub fn typing_delay(&self, chars: usize) -> std::time::Duration {
        let ms = (chars as u64)
            .saturating_mul(self.typing_ms_per_char)
            .min(self.typing_cap_ms);
        std::time::Duration::from_millis(ms)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_200() -> u32 {
    200
}
fn d_500() -> u32 {
    500
}
fn d_1000() -> u32 {
    1000
}
fn d_30() -> u64 {
    30
}
fn d_2000() -> u64 {
    2000
}
fn d_2() -> usize {
    2
}
fn d_300() -> usize {
    300
}
fn d_hint() -> String {
    "(The patient was cut off. Send /continue or any message to hear the rest.)".into()
}
fn d_continue_prompt() -> String {
    "Continue your previous reply exactly where it stopped. Do not repeat anything you already said.".into()
}
fn d_opening() -> String {
    "Hello! What brings you to me today?".into()
}
