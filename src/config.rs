//! Configuration management for bugfixer
//!
//! Settings are resolved once at startup, in layers: built-in defaults, then an
//! optional TOML file, then environment variables. The API credential has no
//! default and its absence is fatal.

use crate::llm::models::SamplingConfig;
use crate::snapshot::ContextMode;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/";
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_ANALYSIS_TEMPERATURE: f64 = 0.3;
const DEFAULT_RETRY_DELAY_MS: u64 = 2000;
const DEFAULT_ANALYSIS_RETRY_DELAY_MS: u64 = 1000;

/// Environment variables consulted for the API credential, in priority order.
const API_KEY_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("GOOGLE_API_KEY or GEMINI_API_KEY not found; set one in the environment")]
    MissingApiKey,

    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("invalid API base URL {url:?}: {source}")]
    InvalidApiBase {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Everything the generator and analyst need to talk to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    /// Upper bound on API calls per fix (and per failure analysis).
    pub max_attempts: u32,
    pub sampling: SamplingConfig,
    /// Failure analysis runs hotter than fix generation.
    pub analysis_temperature: f64,
    pub retry_delay: Duration,
    pub analysis_retry_delay: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            sampling: SamplingConfig::default(),
            analysis_temperature: DEFAULT_ANALYSIS_TEMPERATURE,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            analysis_retry_delay: Duration::from_millis(DEFAULT_ANALYSIS_RETRY_DELAY_MS),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: Url,
    pub request_timeout: Duration,
    pub generation: GenerationConfig,
    /// How much of each affected file goes into the prompt.
    pub context_mode: ContextMode,
    /// Number of defects processed at once. Report order is unaffected.
    pub concurrency: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base.as_str())
            .field("request_timeout", &self.request_timeout)
            .field("generation", &self.generation)
            .field("context_mode", &self.context_mode)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

/// On-disk shape of the optional TOML config file. Every field is optional;
/// unset fields fall through to defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    api_key: Option<String>,
    model: Option<String>,
    api_base: Option<String>,
    max_retries: Option<u32>,
    timeout_secs: Option<u64>,
    temperature: Option<f64>,
    analysis_temperature: Option<f64>,
    top_p: Option<f64>,
    top_k: Option<u32>,
    max_output_tokens: Option<u32>,
    retry_delay_ms: Option<u64>,
    analysis_retry_delay_ms: Option<u64>,
    context_mode: Option<ContextMode>,
    concurrency: Option<usize>,
}

impl Config {
    /// Defaults plus the given credential. Nothing is read from the environment.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: default_api_base(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            generation: GenerationConfig::default(),
            context_mode: ContextMode::default(),
            concurrency: 1,
        }
    }

    /// Load config from the optional file and the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(file, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`], with environment lookups routed through `lookup`.
    pub fn load_with<F>(file: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file_config = match file {
            Some(path) => read_file_config(path)?,
            None => FileConfig::default(),
        };
        Self::from_layers(file_config, &lookup)
    }

    fn from_layers<F>(file: FileConfig, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: String| {
            let key = key.trim();
            (!key.is_empty()).then(|| key.to_string())
        };
        let api_key = API_KEY_VARS
            .iter()
            .find_map(|&var| lookup(var).and_then(non_blank))
            .or_else(|| file.api_key.and_then(non_blank))
            .ok_or(ConfigError::MissingApiKey)?;

        let mut config = Self::with_api_key(api_key);
        let generation = &mut config.generation;

        if let Some(model) = lookup("BUGFIXER_MODEL").or(file.model) {
            generation.model = model;
        }
        if let Some(attempts) = env_parse(lookup, "BUGFIXER_MAX_RETRIES")?.or(file.max_retries) {
            generation.max_attempts = attempts;
        }
        if let Some(t) = env_parse(lookup, "BUGFIXER_TEMPERATURE")?.or(file.temperature) {
            generation.sampling.temperature = t;
        }
        if let Some(t) =
            env_parse(lookup, "BUGFIXER_ANALYSIS_TEMPERATURE")?.or(file.analysis_temperature)
        {
            generation.analysis_temperature = t;
        }
        if let Some(p) = env_parse(lookup, "BUGFIXER_TOP_P")?.or(file.top_p) {
            generation.sampling.top_p = p;
        }
        if let Some(k) = env_parse(lookup, "BUGFIXER_TOP_K")?.or(file.top_k) {
            generation.sampling.top_k = k;
        }
        if let Some(n) =
            env_parse(lookup, "BUGFIXER_MAX_OUTPUT_TOKENS")?.or(file.max_output_tokens)
        {
            generation.sampling.max_output_tokens = n;
        }
        if let Some(ms) = env_parse(lookup, "BUGFIXER_RETRY_DELAY_MS")?.or(file.retry_delay_ms) {
            generation.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse(lookup, "BUGFIXER_ANALYSIS_RETRY_DELAY_MS")?
            .or(file.analysis_retry_delay_ms)
        {
            generation.analysis_retry_delay = Duration::from_millis(ms);
        }

        if let Some(secs) = env_parse(lookup, "BUGFIXER_TIMEOUT_SECS")?.or(file.timeout_secs) {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(mode) = env_parse(lookup, "BUGFIXER_CONTEXT_MODE")?.or(file.context_mode) {
            config.context_mode = mode;
        }
        if let Some(n) = env_parse(lookup, "BUGFIXER_CONCURRENCY")?.or(file.concurrency) {
            config.concurrency = n;
        }
        if let Some(raw) = lookup("BUGFIXER_API_BASE").or(file.api_base) {
            config.api_base = parse_api_base(&raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let generation = &self.generation;
        if generation.max_attempts == 0 {
            return Err(invalid("max_retries", "must be at least 1"));
        }
        check_unit_range("temperature", generation.sampling.temperature)?;
        check_unit_range("analysis_temperature", generation.analysis_temperature)?;
        check_unit_range("top_p", generation.sampling.top_p)?;
        if generation.sampling.max_output_tokens == 0 {
            return Err(invalid("max_output_tokens", "must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency", "must be at least 1"));
        }
        if generation.model.trim().is_empty() {
            return Err(invalid("model", "must not be empty"));
        }
        Ok(())
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn env_parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(key, &format!("{:?} ({})", raw, e))),
    }
}

fn parse_api_base(raw: &str) -> Result<Url, ConfigError> {
    // Url::join replaces the last path segment unless the base ends in '/'.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized).map_err(|source| ConfigError::InvalidApiBase {
        url: raw.to_string(),
        source,
    })
}

fn default_api_base() -> Url {
    Url::parse(DEFAULT_API_BASE).expect("default API base is a valid URL")
}

fn check_unit_range(key: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(key, &format!("{} is outside [0, 1]", value)))
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = Config::load_with(None, env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
    }

    #[test]
    fn test_blank_api_key_is_treated_as_missing() {
        let err = Config::load_with(None, env(&[("GOOGLE_API_KEY", "   ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
    }

    #[test]
    fn test_defaults_match_observed_values() {
        let config = Config::load_with(None, env(&[("GEMINI_API_KEY", "k")])).unwrap();
        assert_eq!(config.api_key, "k");
        assert_eq!(config.generation.model, DEFAULT_MODEL);
        assert_eq!(config.generation.max_attempts, 5);
        assert_eq!(config.generation.sampling.temperature, 0.1);
        assert_eq!(config.generation.sampling.top_p, 0.8);
        assert_eq!(config.generation.sampling.top_k, 40);
        assert_eq!(config.generation.sampling.max_output_tokens, 16384);
        assert_eq!(config.generation.analysis_temperature, 0.3);
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.context_mode, ContextMode::Headers);
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn test_google_key_takes_precedence() {
        let config = Config::load_with(
            None,
            env(&[("GOOGLE_API_KEY", "google"), ("GEMINI_API_KEY", "gemini")]),
        )
        .unwrap();
        assert_eq!(config.api_key, "google");
    }

    #[test]
    fn test_blank_google_key_falls_through_to_gemini() {
        let config = Config::load_with(
            None,
            env(&[("GOOGLE_API_KEY", "  "), ("GEMINI_API_KEY", "real-key")]),
        )
        .unwrap();
        assert_eq!(config.api_key, "real-key");

        let config = Config::load_with(
            None,
            env(&[("GOOGLE_API_KEY", ""), ("GEMINI_API_KEY", "real-key")]),
        )
        .unwrap();
        assert_eq!(config.api_key, "real-key");
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::load_with(
            None,
            env(&[
                ("GOOGLE_API_KEY", "k"),
                ("BUGFIXER_MODEL", "models/other"),
                ("BUGFIXER_MAX_RETRIES", "3"),
                ("BUGFIXER_TEMPERATURE", "0.5"),
                ("BUGFIXER_RETRY_DELAY_MS", "0"),
                ("BUGFIXER_CONTEXT_MODE", "full"),
                ("BUGFIXER_CONCURRENCY", "4"),
                ("BUGFIXER_API_BASE", "http://localhost:9000"),
            ]),
        )
        .unwrap();
        assert_eq!(config.generation.model, "models/other");
        assert_eq!(config.generation.max_attempts, 3);
        assert_eq!(config.generation.sampling.temperature, 0.5);
        assert_eq!(config.generation.retry_delay, Duration::ZERO);
        assert_eq!(config.context_mode, ContextMode::Full);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.api_base.as_str(), "http://localhost:9000/");
    }

    #[test]
    fn test_unparsable_number_is_rejected() {
        let err = Config::load_with(
            None,
            env(&[("GOOGLE_API_KEY", "k"), ("BUGFIXER_MAX_RETRIES", "many")]),
        )
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref key, .. } if key == "BUGFIXER_MAX_RETRIES")
        );
    }

    #[test]
    fn test_out_of_range_temperature_is_rejected() {
        let err = Config::load_with(
            None,
            env(&[("GOOGLE_API_KEY", "k"), ("BUGFIXER_TEMPERATURE", "1.5")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let err = Config::load_with(
            None,
            env(&[("GOOGLE_API_KEY", "k"), ("BUGFIXER_MAX_RETRIES", "0")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_file_layer_sits_under_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bugfixer.toml");
        fs::write(
            &path,
            "api_key = \"from-file\"\nmodel = \"models/file\"\nmax_retries = 2\n",
        )
        .unwrap();

        let config =
            Config::load_with(Some(&path), env(&[("BUGFIXER_MAX_RETRIES", "7")])).unwrap();
        assert_eq!(config.api_key, "from-file");
        assert_eq!(config.generation.model, "models/file");
        assert_eq!(config.generation.max_attempts, 7);
    }

    #[test]
    fn test_unknown_file_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bugfixer.toml");
        fs::write(&path, "api_key = \"k\"\nbogus = 1\n").unwrap();

        let err = Config::load_with(Some(&path), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = Config::with_api_key("super-secret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
