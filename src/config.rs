//! TOML configuration for slawatch.
//!
//! Every section has defaults, so an empty file (or no file at all) is a
//! valid configuration that runs the built-in SLA rule set.

use std::path::{Path, PathBuf};

use crate::detect::{RuleSet, ThresholdRule};
use crate::ingest::{OrderingPolicy, ValidationOptions};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming a config file to load.
pub const CONFIG_ENV: &str = "SLAWATCH_CONFIG";
const LOCAL_CONFIG: &str = "slawatch.toml";

/// Fatal configuration problems. Any of these aborts a run before a single
/// record is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("rule set is empty")]
    EmptyRuleSet,

    #[error("rule #{index}: metric name is empty")]
    EmptyMetric { index: usize },

    #[error("rule #{index} ({metric}): limit must be finite, got {limit}")]
    NonFiniteLimit {
        index: usize,
        metric: String,
        limit: f64,
    },

    #[error("unknown comparator '{0}' (expected >, >=, <, <=)")]
    UnknownComparator(String),

    #[error("unknown severity '{0}' (expected low, medium, high, critical)")]
    UnknownSeverity(String),

    #[error("gap tolerance must be greater than zero")]
    ZeroGapTolerance,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlawatchConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Ordered threshold rules. Empty means the built-in SLA set.
    #[serde(default)]
    pub rules: Vec<ThresholdRule>,
}

impl SlawatchConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), rules = config.rules.len(), "Loaded configuration");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Try, in order: the file named by `SLAWATCH_CONFIG`, `./slawatch.toml`,
    /// then compiled-in defaults. Only the absence of any config file falls
    /// back to defaults; a file that exists but does not load is an error.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::resolve(explicit.as_deref(), Path::new(LOCAL_CONFIG))
    }

    fn resolve(explicit: Option<&Path>, local: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if local.exists() {
            return Self::load(local);
        }
        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    /// The validated rule set this config describes.
    pub fn rule_set(&self) -> Result<RuleSet, ConfigError> {
        if self.rules.is_empty() {
            debug!("no [[rules]] configured, using built-in SLA rules");
            return Ok(RuleSet::sla_defaults());
        }
        RuleSet::new(self.rules.clone())
    }

    /// Check everything a run needs, without running anything.
    pub fn validate(&self) -> Result<RuleSet, ConfigError> {
        if self.engine.gap_tolerance_secs == 0 {
            return Err(ConfigError::ZeroGapTolerance);
        }
        self.rule_set()
    }

    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            ordering: self.engine.ordering,
            default_node_id: self.ingest.default_node_id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest gap between two violations of the same node metric that
    /// still counts as one incident. Default: two 60 s sampling intervals.
    pub gap_tolerance_secs: u64,
    /// Handling of records older than their node's previous record.
    pub ordering: OrderingPolicy,
    /// Worker threads for parallel stages; 0 uses the rayon default.
    pub workers: usize,
    /// Deduplicator shards.
    pub shards: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gap_tolerance_secs: 120,
            ordering: OrderingPolicy::Reject,
            workers: 0,
            shards: 8,
        }
    }
}

impl EngineConfig {
    pub fn gap_tolerance(&self) -> chrono::Duration {
        let secs = self.gap_tolerance_secs.min(i64::MAX as u64 / 1000) as i64;
        chrono::Duration::seconds(secs)
    }
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Node id for records without one (single-host dumps). Unset means
    /// every record must carry `node_id`.
    pub default_node_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
