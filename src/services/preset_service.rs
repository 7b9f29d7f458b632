use std::sync::Arc;

use crate::errors::Result;
use crate::models::{GenerationPreset, PresetParameters};
use crate::prompt_builder::AiRequest;
use crate::storage::PresetStore;

#[derive(Clone)]
pub struct PresetService {
    store: Arc<dyn PresetStore>,
}

impl PresetService {
    #[must_use]
    pub fn new(store: Arc<dyn PresetStore>) -> Self {
        Self { store }
    }

    /// The active preset for the scope and API family; missing selection is
    /// "feature absent".
    ///
    /// # Errors
    ///
    /// Returns storage errors surfaced by the persistence collaborator.
    pub async fn load(
        &self,
        scope: Option<i64>,
        api_family: &str,
    ) -> Result<Option<GenerationPreset>> {
        match self.store.get_active_preset(scope, api_family).await {
            Ok(preset) => Ok(preset),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Copies each present parameter onto the request. Absent parameters leave
/// the request untouched (zeros were already normalized to absent at decode
/// time), so presets can be layered safely.
pub fn apply_preset(parameters: &PresetParameters, request: &mut AiRequest) {
    if let Some(temperature) = parameters.temperature {
        request.temperature = Some(temperature);
    }
    if let Some(top_p) = parameters.top_p {
        request.top_p = Some(top_p);
    }
    if let Some(top_k) = parameters.top_k {
        request.top_k = Some(top_k);
    }
    if let Some(max_tokens) = parameters.max_tokens {
        request.max_tokens = Some(max_tokens);
    }
    if let Some(presence_penalty) = parameters.presence_penalty {
        request.presence_penalty = Some(presence_penalty);
    }
    if let Some(frequency_penalty) = parameters.frequency_penalty {
        request.frequency_penalty = Some(frequency_penalty);
    }
    if let Some(stop_sequences) = &parameters.stop_sequences {
        request.stop_sequences = Some(stop_sequences.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_sets_present_fields() {
        let parameters = PresetParameters {
            temperature: Some(0.7),
            max_tokens: Some(512),
            ..PresetParameters::default()
        };
        let mut request = AiRequest::default();
        apply_preset(&parameters, &mut request);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.top_p, None);
    }

    #[test]
    fn test_apply_absent_never_clears_existing() {
        let mut request = AiRequest {
            temperature: Some(0.9),
            stop_sequences: Some(vec!["###".to_string()]),
            ..AiRequest::default()
        };
        apply_preset(&PresetParameters::default(), &mut request);
        assert_eq!(request.temperature, Some(0.9));
        assert_eq!(request.stop_sequences, Some(vec!["###".to_string()]));
    }

    #[test]
    fn test_apply_layers_later_preset_over_earlier() {
        let mut request = AiRequest::default();
        apply_preset(
            &PresetParameters {
                temperature: Some(0.5),
                top_p: Some(0.9),
                ..PresetParameters::default()
            },
            &mut request,
        );
        apply_preset(
            &PresetParameters {
                temperature: Some(0.8),
                ..PresetParameters::default()
            },
            &mut request,
        );
        assert_eq!(request.temperature, Some(0.8));
        assert_eq!(request.top_p, Some(0.9));
    }
}
