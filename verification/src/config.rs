//! Engine configuration: TOML file plus `VERIFY_*` environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::convergence::CoverageConfig;
use crate::issue::ExtractionCapability;
use crate::session::VerificationModeConfig;
use crate::tiering::TieredConfig;

/// Errors from loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidOverride {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Round budget for new sessions.
    pub max_rounds: u32,
    pub extraction: ExtractionCapability,
    pub mode: VerificationModeConfig,
    pub tiered: TieredConfig,
    pub coverage: CoverageConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            extraction: ExtractionCapability::default(),
            mode: VerificationModeConfig::default(),
            tiered: TieredConfig::default(),
            coverage: CoverageConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `VERIFY_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("VERIFY_MAX_ROUNDS") {
            self.max_rounds = parse_override("VERIFY_MAX_ROUNDS", &val)?;
        }
        if let Some(val) = lookup("VERIFY_MODE") {
            self.mode.mode = parse_override("VERIFY_MODE", &val)?;
        }
        if let Some(val) = lookup("VERIFY_EXTRACTION") {
            self.extraction = parse_override("VERIFY_EXTRACTION", &val)?;
        }
        if let Some(val) = lookup("VERIFY_MAX_TOTAL_TOKENS") {
            self.tiered.max_total_tokens = Some(parse_override("VERIFY_MAX_TOTAL_TOKENS", &val)?);
        }
        if let Some(val) = lookup("VERIFY_ENFORCE_TOKEN_BUDGET") {
            self.tiered.enforce_token_budget = parse_flag("VERIFY_ENFORCE_TOKEN_BUDGET", &val)?;
        }
        if let Some(val) = lookup("VERIFY_QUALITY_FIRST") {
            self.tiered.quality_first = parse_flag("VERIFY_QUALITY_FIRST", &val)?;
        }
        Ok(())
    }
}

fn parse_override<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidOverride {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidOverride {
            var,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
