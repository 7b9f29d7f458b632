// src/config.rs

use secrecy::SecretString;
use serde::Deserialize;

/// Runtime configuration, loaded from environment variables.
#[derive(Deserialize, Clone)]
pub struct Config {
    // LLM client
    pub gemini_api_key: Option<SecretString>,
    #[serde(default = "default_summary_model")]
    pub summary_model: String,

    // Context budget
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    #[serde(default = "default_summary_threshold")]
    pub summary_threshold: f32,
    #[serde(default = "default_min_recent_pairs")]
    pub min_recent_pairs: usize,
    #[serde(default = "default_summarization_timeout_secs")]
    pub summarization_timeout_secs: u64,

    pub environment: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("summary_model", &self.summary_model)
            .field("max_context_tokens", &self.max_context_tokens)
            .field("summary_threshold", &self.summary_threshold)
            .field("min_recent_pairs", &self.min_recent_pairs)
            .field(
                "summarization_timeout_secs",
                &self.summarization_timeout_secs,
            )
            .field("environment", &self.environment)
            .finish()
    }
}

impl Config {
    /// Loads the configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a set variable fails to deserialize (e.g. a
    /// non-numeric `MAX_CONTEXT_TOKENS`). Unset variables fall back to the
    /// serde defaults.
    pub fn load() -> Result<Self, anyhow::Error> {
        envy::from_env::<Self>().map_err(anyhow::Error::from)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            summary_model: default_summary_model(),
            max_context_tokens: default_max_context_tokens(),
            summary_threshold: default_summary_threshold(),
            min_recent_pairs: default_min_recent_pairs(),
            summarization_timeout_secs: default_summarization_timeout_secs(),
            environment: None,
        }
    }
}

// Default value functions for serde

fn default_summary_model() -> String {
    "gemini-2.0-flash".to_string()
}

const fn default_max_context_tokens() -> usize {
    8192
}

const fn default_summary_threshold() -> f32 {
    0.75
}

const fn default_min_recent_pairs() -> usize {
    3
}

const fn default_summarization_timeout_secs() -> u64 {
    60
}
