//! Threshold detection, incident grouping and severity ranking.

pub mod evaluator;
pub mod incident;
pub mod ranking;
pub mod rules;

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};

pub use evaluator::{evaluate, RawViolation};
pub use incident::{deduplicate, CloseReason, DedupOutput, Deduplicator, Incident, IncidentStatus};
pub use ranking::{rank, RankedIncident};
pub use rules::{Comparator, RuleSet, ThresholdRule};

/// Severity tiers, ordered so that `Critical` compares greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(ConfigError::UnknownSeverity(s.to_string())),
        }
    }
}
