use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// A named bundle of generation parameters for one API family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPreset {
    pub id: i64,
    /// `None` marks a global preset visible to every scope.
    pub user_id: Option<i64>,
    pub name: String,
    pub api_family: String,
    pub parameters: PresetParameters,
}

#[derive(Debug, Clone)]
pub struct NewGenerationPreset {
    pub user_id: Option<i64>,
    pub name: String,
    pub api_family: String,
    pub parameters: PresetParameters,
}

/// Decoded generation parameters. Every field is optional: absent means
/// "do not override". Explicit zeros in the raw document are normalized to
/// absent at decode time, so downstream application never has to treat
/// zero specially.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PresetParameters {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub top_k: Option<i32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
}

impl PresetParameters {
    /// Decodes a raw parameter document and normalizes zero values away.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the document shape does not match.
    pub fn from_raw(raw: &serde_json::Value) -> Result<Self> {
        let parameters: Self = serde_json::from_value(raw.clone())?;
        Ok(parameters.normalized())
    }

    /// Maps zero and empty values to `None`.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            temperature: self.temperature.filter(|v| *v != 0.0),
            top_p: self.top_p.filter(|v| *v != 0.0),
            top_k: self.top_k.filter(|v| *v != 0),
            max_tokens: self.max_tokens.filter(|v| *v != 0),
            presence_penalty: self.presence_penalty.filter(|v| *v != 0.0),
            frequency_penalty: self.frequency_penalty.filter(|v| *v != 0.0),
            stop_sequences: self.stop_sequences.filter(|v| !v.is_empty()),
        }
    }
}
