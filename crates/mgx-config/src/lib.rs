// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for magex-resilience.
//!
//! [`ResilienceConfig`] holds the settings a handling context is built
//! from: the environment and version stamped into errors, the retry and
//! backoff budgets, and metrics summary sizing. Helpers load it from TOML,
//! apply `MGX_*` environment overrides, merge overlays, and report
//! advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// A retry budget is unusually large.
    LargeRetryBudget {
        /// Section the budget was set in.
        section: String,
        /// Configured number of retries.
        retries: u32,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeRetryBudget { section, retries } => {
                write!(f, "[{section}] allows {retries} retries")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level resilience configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResilienceConfig {
    /// Deployment environment stamped into error contexts (e.g. `"ci"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// Application version stamped into error contexts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Fixed-delay retry settings.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Exponential backoff settings.
    #[serde(default)]
    pub backoff: BackoffSettings,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// `[retry]`: fixed-delay retry budget.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Delay between attempts in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl RetrySettings {
    /// Configured retries or [`DEFAULT_RETRIES`].
    pub fn retries(&self) -> u32 {
        self.retries.unwrap_or(DEFAULT_RETRIES)
    }

    /// Configured delay or [`DEFAULT_RETRY_DELAY_MS`].
    pub fn delay_ms(&self) -> u64 {
        self.delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS)
    }
}

/// `[backoff]`: exponential backoff parameters.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct BackoffSettings {
    /// Retries after the first attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// First delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,
    /// Upper bound on any delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    /// Growth factor applied after each delay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
}

impl BackoffSettings {
    /// Configured retries or [`DEFAULT_RETRIES`].
    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_RETRIES)
    }

    /// Configured first delay or [`DEFAULT_INITIAL_DELAY_MS`].
    pub fn initial_delay_ms(&self) -> u64 {
        self.initial_delay_ms.unwrap_or(DEFAULT_INITIAL_DELAY_MS)
    }

    /// Configured delay cap or [`DEFAULT_MAX_DELAY_MS`].
    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms.unwrap_or(DEFAULT_MAX_DELAY_MS)
    }

    /// Configured multiplier or [`DEFAULT_MULTIPLIER`].
    pub fn multiplier(&self) -> f64 {
        self.multiplier.unwrap_or(DEFAULT_MULTIPLIER)
    }
}

/// `[metrics]`: summary sizing.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct MetricsSettings {
    /// Codes listed in a metrics summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_errors: Option<usize>,
}

impl MetricsSettings {
    /// Configured top-N or [`DEFAULT_TOP_ERRORS`].
    pub fn top_errors(&self) -> usize {
        self.top_errors.unwrap_or(DEFAULT_TOP_ERRORS)
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default retry budget for both strategies.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default fixed retry delay.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

/// Default first backoff delay.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

/// Default backoff cap (30 seconds).
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Default backoff growth factor.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default number of codes in a metrics summary.
pub const DEFAULT_TOP_ERRORS: usize = 10;

/// Retry budgets above this generate a warning.
const LARGE_RETRY_THRESHOLD: u32 = 10;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`ResilienceConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`ResilienceConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<ResilienceConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => ResilienceConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`ResilienceConfig`].
pub fn parse_toml(content: &str) -> Result<ResilienceConfig, ConfigError> {
    toml::from_str::<ResilienceConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// JSON schema describing [`ResilienceConfig`].
pub fn config_schema() -> schemars::Schema {
    schemars::schema_for!(ResilienceConfig)
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `MGX_ENVIRONMENT`
/// - `MGX_VERSION`
/// - `MGX_MAX_RETRIES`
/// - `MGX_INITIAL_DELAY_MS`
pub fn apply_env_overrides(config: &mut ResilienceConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup` instead of the process environment.
///
/// Numeric values that fail to parse are ignored.
pub fn apply_overrides_from<F>(config: &mut ResilienceConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("MGX_ENVIRONMENT") {
        config.environment = Some(val);
    }
    if let Some(val) = lookup("MGX_VERSION") {
        config.version = Some(val);
    }
    if let Some(n) = lookup("MGX_MAX_RETRIES").and_then(|v| v.trim().parse().ok()) {
        config.backoff.max_retries = Some(n);
    }
    if let Some(n) = lookup("MGX_INITIAL_DELAY_MS").and_then(|v| v.trim().parse().ok()) {
        config.backoff.initial_delay_ms = Some(n);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (a multiplier below 1.0, a zero top-N, an initial delay above
/// the cap) are returned as a [`ConfigError::ValidationError`]; soft issues
/// come back as warnings.
pub fn validate_config(config: &ResilienceConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(m) = config.backoff.multiplier {
        if !m.is_finite() || m < 1.0 {
            errors.push(format!("backoff multiplier {m} must be at least 1.0"));
        }
    }

    let initial = config.backoff.initial_delay_ms();
    let max = config.backoff.max_delay_ms();
    if initial > max {
        errors.push(format!(
            "backoff initial_delay_ms {initial} exceeds max_delay_ms {max}"
        ));
    }

    if config.metrics.top_errors == Some(0) {
        errors.push("metrics top_errors must be at least 1".into());
    }

    for (section, retries) in [
        ("retry", config.retry.retries),
        ("backoff", config.backoff.max_retries),
    ] {
        if let Some(n) = retries {
            if n > LARGE_RETRY_THRESHOLD {
                warnings.push(ConfigWarning::LargeRetryBudget {
                    section: section.into(),
                    retries: n,
                });
            }
        }
    }

    if config.environment.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "environment".into(),
            hint: "errors will not carry an environment".into(),
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values set in `overlay` take precedence over
/// `base`, field by field.
pub fn merge_configs(base: ResilienceConfig, overlay: ResilienceConfig) -> ResilienceConfig {
    ResilienceConfig {
        environment: overlay.environment.or(base.environment),
        version: overlay.version.or(base.version),
        retry: RetrySettings {
            retries: overlay.retry.retries.or(base.retry.retries),
            delay_ms: overlay.retry.delay_ms.or(base.retry.delay_ms),
        },
        backoff: BackoffSettings {
            max_retries: overlay.backoff.max_retries.or(base.backoff.max_retries),
            initial_delay_ms: overlay
                .backoff
                .initial_delay_ms
                .or(base.backoff.initial_delay_ms),
            max_delay_ms: overlay.backoff.max_delay_ms.or(base.backoff.max_delay_ms),
            multiplier: overlay.backoff.multiplier.or(base.backoff.multiplier),
        },
        metrics: MetricsSettings {
            top_errors: overlay.metrics.top_errors.or(base.metrics.top_errors),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
