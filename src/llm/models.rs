use serde::{Deserialize, Serialize};

/// Default sampling for fix generation: low temperature for consistent patches
const DEFAULT_TEMPERATURE: f64 = 0.1;
const DEFAULT_TOP_P: f64 = 0.8;
const DEFAULT_TOP_K: u32 = 40;
/// Large enough for multi-file patches
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 16384;

/// Sampling parameters sent with every generation request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

impl SamplingConfig {
    /// Same thresholds, different temperature.
    pub fn with_temperature(self, temperature: f64) -> Self {
        Self {
            temperature,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sampling() {
        let sampling = SamplingConfig::default();
        assert_eq!(sampling.temperature, 0.1);
        assert_eq!(sampling.top_p, 0.8);
        assert_eq!(sampling.top_k, 40);
        assert_eq!(sampling.max_output_tokens, 16384);
    }

    #[test]
    fn test_with_temperature_keeps_thresholds() {
        let hot = SamplingConfig::default().with_temperature(0.3);
        assert_eq!(hot.temperature, 0.3);
        assert_eq!(hot.top_k, 40);
        assert_eq!(hot.max_output_tokens, 16384);
    }
}
