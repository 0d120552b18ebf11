//! Configuration for the engine and its transport.
//!
//! Sources, lowest precedence first: built-in defaults, an optional YAML
//! file, environment variables.
//!
//! # Environment Variables
//!
//! - `IGNITION_API_KEY` (fallback `OPENAI_API_KEY`) - bearer token
//! - `IGNITION_BASE_URL` (fallback `OPENAI_BASE_URL`) - API base URL
//! - `IGNITION_MODEL` - model for text personas
//! - `IGNITION_VISION_MODEL` - model for vision personas
//! - `IGNITION_TIMEOUT_SECS` - per-request timeout
//! - `IGNITION_MAX_RETRIES` - retries after the first attempt
//! - `IGNITION_HISTORY_BOUND` - workspace history length
//! - `IGNITION_MAX_CYCLES` - loop length for the CLI
//!
//! # Example YAML
//!
//! ```yaml
//! engine:
//!   history_bound: 32
//!   max_cycles: 4
//!   target_certainty: 90
//! transport:
//!   base_url: "https://openrouter.ai/api/v1"
//!   text_model: "minimax/minimax-m2"
//!   default_headers:
//!     X-Title: "Ignition"
//! personas:
//!   - id: geometry
//!     display_name: Geometry
//!     system_prompt: "You are obsessed with spatial structure..."
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::analyzers::Persona;
use crate::error::IgnitionError;

/// Longest per-request timeout accepted (one day).
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of entries kept in workspace history.
    pub history_bound: usize,
    /// Default loop length used by drivers that do not pass their own.
    pub max_cycles: Option<usize>,
    /// Stop the loop once the monitor reports at least this certainty (0-100).
    pub target_certainty: Option<u8>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_bound: 64,
            max_cycles: Some(5),
            target_certainty: None,
        }
    }
}

/// Transport settings for the OpenAI-compatible client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bearer token. Never serialized.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Model for personas that do not name one.
    pub text_model: String,
    /// Model for vision personas that do not name one.
    pub vision_model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: f64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds. Doubles per retry.
    pub backoff_base_ms: u64,
    /// Ask for `response_format: json_object` on text requests.
    pub json_mode: bool,
    /// Extra headers sent with every request (e.g. OpenRouter's `X-Title`).
    pub default_headers: HashMap<String, String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            text_model: "gpt-4o-mini".to_string(),
            vision_model: "gpt-4o".to_string(),
            timeout_secs: 60.0,
            max_retries: 4,
            backoff_base_ms: 1_000,
            json_mode: true,
            default_headers: HashMap::new(),
        }
    }
}

impl TransportConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, IgnitionError> {
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from `lookup` (an environment accessor).
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), IgnitionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("IGNITION_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup("IGNITION_BASE_URL").or_else(|| lookup("OPENAI_BASE_URL")) {
            self.base_url = url;
        }
        if let Some(model) = lookup("IGNITION_MODEL") {
            self.text_model = model;
        }
        if let Some(model) = lookup("IGNITION_VISION_MODEL") {
            self.vision_model = model;
        }
        if let Some(timeout) = parse_var(&lookup, "IGNITION_TIMEOUT_SECS")? {
            self.timeout_secs = timeout;
        }
        if let Some(retries) = parse_var(&lookup, "IGNITION_MAX_RETRIES")? {
            self.max_retries = retries;
        }
        self.validate()
    }

    /// Reject values the transport cannot run with.
    pub fn validate(&self) -> Result<(), IgnitionError> {
        if !(self.timeout_secs.is_finite() && self.timeout_secs > 0.0) {
            return Err(IgnitionError::config(format!(
                "timeout_secs must be positive, got {}",
                self.timeout_secs
            )));
        }
        if self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(IgnitionError::config(format!(
                "timeout_secs must be at most {}, got {}",
                MAX_TIMEOUT_SECS, self.timeout_secs
            )));
        }
        if self.base_url.trim().is_empty() {
            return Err(IgnitionError::config("base_url cannot be empty"));
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Overlay values from `lookup` (an environment accessor).
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), IgnitionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bound) = parse_var(&lookup, "IGNITION_HISTORY_BOUND")? {
            self.history_bound = bound;
        }
        if let Some(cycles) = parse_var(&lookup, "IGNITION_MAX_CYCLES")? {
            self.max_cycles = Some(cycles);
        }
        self.validate()
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), IgnitionError> {
        if self.history_bound == 0 {
            return Err(IgnitionError::config("history_bound must be at least 1"));
        }
        if self.max_cycles == Some(0) {
            return Err(IgnitionError::config("max_cycles must be at least 1"));
        }
        if let Some(target) = self.target_certainty {
            if target > 100 {
                return Err(IgnitionError::config(format!(
                    "target_certainty must be within 0-100, got {}",
                    target
                )));
            }
        }
        Ok(())
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnitionConfig {
    pub engine: EngineConfig,
    pub transport: TransportConfig,
    /// Personas in registration (tie-break) order. Empty means built-ins.
    pub personas: Vec<Persona>,
}

impl IgnitionConfig {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, IgnitionError> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| IgnitionError::config(format!("invalid configuration YAML: {}", e)))?;
        config.engine.validate()?;
        config.transport.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, IgnitionError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            IgnitionError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&yaml)
    }

    /// Overlay the process environment onto both sections.
    pub fn apply_env(&mut self) -> Result<(), IgnitionError> {
        let lookup = |key: &str| std::env::var(key).ok();
        self.engine.apply_env_with(lookup)?;
        self.transport.apply_env_with(lookup)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, IgnitionError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| IgnitionError::config(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_transport_env_fallbacks() {
        let mut cfg = TransportConfig::default();
        cfg.apply_env_with(env(&[
            ("OPENAI_API_KEY", "sk-fallback"),
            ("IGNITION_BASE_URL", "https://openrouter.ai/api/v1"),
            ("OPENAI_BASE_URL", "https://ignored"),
            ("IGNITION_MAX_RETRIES", "2"),
        ]))
        .unwrap();

        assert_eq!(cfg.api_key.as_deref(), Some("sk-fallback"));
        assert_eq!(cfg.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(cfg.max_retries, 2);
    }

    #[test]
    fn test_transport_env_rejects_garbage() {
        let mut cfg = TransportConfig::default();
        let err = cfg
            .apply_env_with(env(&[("IGNITION_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("IGNITION_TIMEOUT_SECS"));

        let mut cfg = TransportConfig::default();
        assert!(cfg
            .apply_env_with(env(&[("IGNITION_TIMEOUT_SECS", "0")]))
            .is_err());
    }

    #[test]
    fn test_out_of_range_timeout_rejected() {
        let err = IgnitionConfig::from_yaml("transport:\n  timeout_secs: 1.0e300\n  api_key: sk-x\n")
            .unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));

        let cfg = TransportConfig {
            timeout_secs: MAX_TIMEOUT_SECS,
            ..TransportConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_engine_validation() {
        assert!(EngineConfig::default().validate().is_ok());

        let mut cfg = EngineConfig::default();
        assert!(cfg
            .apply_env_with(env(&[("IGNITION_HISTORY_BOUND", "0")]))
            .is_err());

        let cfg = EngineConfig {
            target_certainty: Some(120),
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_yaml_with_defaults() {
        let yaml = r#"
engine:
  history_bound: 8
transport:
  text_model: "local-model"
personas:
  - id: geometry
    display_name: Geometry
    system_prompt: "spatial"
"#;
        let cfg = IgnitionConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.engine.history_bound, 8);
        assert_eq!(cfg.engine.max_cycles, Some(5));
        assert_eq!(cfg.transport.text_model, "local-model");
        assert_eq!(cfg.transport.max_retries, 4);
        assert_eq!(cfg.personas.len(), 1);
        assert_eq!(cfg.personas[0].id, "geometry");
    }

    #[test]
    fn test_yaml_file_errors() {
        let err = IgnitionConfig::from_yaml_file("/nonexistent/ignition.yaml").unwrap_err();
        assert!(matches!(err, IgnitionError::Configuration(_)));

        let err = IgnitionConfig::from_yaml("engine: [not, a, map]").unwrap_err();
        assert!(err.to_string().contains("invalid configuration YAML"));
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let cfg = TransportConfig {
            api_key: Some("sk-secret".into()),
            ..TransportConfig::default()
        };
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        assert!(!yaml.contains("sk-secret"));
    }
}
