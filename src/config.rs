//! Environment-driven configuration

use crate::types::ModelTier;
use anyhow::{bail, Context, Result};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com";
pub const DEFAULT_PORT: u16 = 8090;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Concrete model names behind each tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    pub fast: String,
    pub accurate: String,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            fast: "gpt-3.5-turbo-1106".to_string(),
            accurate: "gpt-4-1106-preview".to_string(),
        }
    }
}

impl ModelCatalog {
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Accurate => &self.accurate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForgeConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub organization: Option<String>,
    pub models: ModelCatalog,
    pub model_tier: ModelTier,
    pub request_timeout: Duration,
    pub port: u16,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            organization: None,
            models: ModelCatalog::default(),
            model_tier: ModelTier::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            port: DEFAULT_PORT,
        }
    }
}

impl ForgeConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model_tier = match non_empty("DOCFORGE_MODEL_TIER") {
            Some(raw) => raw
                .parse::<ModelTier>()
                .map_err(anyhow::Error::msg)
                .context("invalid DOCFORGE_MODEL_TIER")?,
            None => defaults.model_tier,
        };

        let request_timeout = match non_empty("DOCFORGE_REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("invalid DOCFORGE_REQUEST_TIMEOUT_SECS '{}'", raw))?;
                if secs == 0 {
                    bail!("invalid DOCFORGE_REQUEST_TIMEOUT_SECS '{}': must be at least 1", raw);
                }
                Duration::from_secs(secs)
            }
            None => defaults.request_timeout,
        };

        let port = match non_empty("DOCFORGE_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("invalid DOCFORGE_PORT '{}'", raw))?,
            None => defaults.port,
        };

        Ok(Self {
            endpoint: non_empty("DOCFORGE_ENDPOINT")
                .map(|e| e.trim_end_matches('/').to_string())
                .unwrap_or(defaults.endpoint),
            api_key: non_empty("OPENAI_API_KEY"),
            organization: non_empty("OPENAI_ORG_ID"),
            models: ModelCatalog {
                fast: non_empty("DOCFORGE_FAST_MODEL").unwrap_or(defaults.models.fast),
                accurate: non_empty("DOCFORGE_ACCURATE_MODEL").unwrap_or(defaults.models.accurate),
            },
            model_tier,
            request_timeout,
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let cfg = ForgeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.model_tier, ModelTier::Accurate);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.request_timeout, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = ForgeConfig::from_lookup(lookup(&[
            ("DOCFORGE_ENDPOINT", "http://localhost:9000/"),
            ("DOCFORGE_MODEL_TIER", "fast"),
            ("DOCFORGE_FAST_MODEL", "small-model"),
            ("DOCFORGE_REQUEST_TIMEOUT_SECS", "30"),
            ("DOCFORGE_PORT", "9999"),
            ("OPENAI_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert_eq!(cfg.endpoint, "http://localhost:9000");
        assert_eq!(cfg.model_tier, ModelTier::Fast);
        assert_eq!(cfg.models.model_for(ModelTier::Fast), "small-model");
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.port, 9999);
        assert_eq!(cfg.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = ForgeConfig::from_lookup(lookup(&[("DOCFORGE_PORT", "eighty")])).unwrap_err();
        assert!(format!("{:#}", err).contains("DOCFORGE_PORT"));

        let err = ForgeConfig::from_lookup(lookup(&[("DOCFORGE_MODEL_TIER", "huge")])).unwrap_err();
        assert!(format!("{:#}", err).contains("DOCFORGE_MODEL_TIER"));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = ForgeConfig::from_lookup(lookup(&[("DOCFORGE_REQUEST_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(format!("{:#}", err).contains("DOCFORGE_REQUEST_TIMEOUT_SECS"));

        let cfg = ForgeConfig::from_lookup(lookup(&[("DOCFORGE_REQUEST_TIMEOUT_SECS", "1")])).unwrap();
        assert_eq!(cfg.request_timeout, Duration::from_secs(1));
    }
}
