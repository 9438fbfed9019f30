//! Static threshold rules and the validated, ordered rule set.

use super::Severity;
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Comparator {
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
}

impl Comparator {
    pub fn check(&self, value: f64, limit: f64) -> bool {
        match self {
            Self::GreaterThan => value > limit,
            Self::GreaterEqual => value >= limit,
            Self::LessThan => value < limit,
            Self::LessEqual => value <= limit,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::GreaterEqual => ">=",
            Self::LessThan => "<",
            Self::LessEqual => "<=",
        }
    }
}

impl FromStr for Comparator {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" | "gt" | "greater_than" => Ok(Self::GreaterThan),
            ">=" | "gte" | "greater_equal" => Ok(Self::GreaterEqual),
            "<" | "lt" | "less_than" => Ok(Self::LessThan),
            "<=" | "lte" | "less_equal" => Ok(Self::LessEqual),
            other => Err(ConfigError::UnknownComparator(other.to_string())),
        }
    }
}

impl TryFrom<String> for Comparator {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Comparator> for String {
    fn from(value: Comparator) -> Self {
        value.symbol().to_string()
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.symbol())
    }
}

/// A single `metric <comparator> limit -> severity` rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub metric: String,
    pub comparator: Comparator,
    pub limit: f64,
    pub severity: Severity,
}

impl ThresholdRule {
    pub fn new(metric: &str, comparator: Comparator, limit: f64, severity: Severity) -> Self {
        Self {
            metric: metric.to_string(),
            comparator,
            limit,
            severity,
        }
    }

    pub fn is_violated_by(&self, value: f64) -> bool {
        self.comparator.check(value, self.limit)
    }
}

impl std::fmt::Display for ThresholdRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} -> {}",
            self.metric, self.comparator, self.limit, self.severity
        )
    }
}

/// Ordered, validated rules. Read-only for the whole run; stages borrow it.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    rules: Vec<ThresholdRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ThresholdRule>) -> Result<Self, ConfigError> {
        if rules.is_empty() {
            return Err(ConfigError::EmptyRuleSet);
        }
        for (index, rule) in rules.iter().enumerate() {
            if rule.metric.trim().is_empty() {
                return Err(ConfigError::EmptyMetric { index });
            }
            if !rule.limit.is_finite() {
                return Err(ConfigError::NonFiniteLimit {
                    index,
                    metric: rule.metric.clone(),
                    limit: rule.limit,
                });
            }
        }
        Ok(Self { rules })
    }

    /// SLA thresholds used when a config file carries no `[[rules]]`.
    pub fn sla_defaults() -> Self {
        use Comparator::GreaterThan as Gt;
        let rules = vec![
            ThresholdRule::new("cpu_usage", Gt, 95.0, Severity::Critical),
            ThresholdRule::new("cpu_usage", Gt, 85.0, Severity::High),
            ThresholdRule::new("cpu_usage", Gt, 75.0, Severity::Medium),
            ThresholdRule::new("memory_usage", Gt, 80.0, Severity::High),
            ThresholdRule::new("memory_usage", Gt, 70.0, Severity::Medium),
            ThresholdRule::new("latency_ms", Gt, 250.0, Severity::High),
            ThresholdRule::new("latency_ms", Gt, 180.0, Severity::Medium),
            ThresholdRule::new("error_rate", Gt, 0.10, Severity::Critical),
            ThresholdRule::new("error_rate", Gt, 0.05, Severity::High),
            ThresholdRule::new("error_rate", Gt, 0.02, Severity::Medium),
            ThresholdRule::new("temperature_celsius", Gt, 75.0, Severity::High),
            ThresholdRule::new("temperature_celsius", Gt, 65.0, Severity::Medium),
            ThresholdRule::new("io_wait", Gt, 10.0, Severity::Medium),
            ThresholdRule::new("io_wait", Gt, 7.0, Severity::Low),
        ];
        Self { rules }
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules paired with their position in the set.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ThresholdRule)> {
        self.rules.iter().enumerate()
    }
}
