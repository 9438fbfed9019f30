use super::rules::{RuleSet, ThresholdRule};
use crate::ingest::Snapshot;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::info;

/// One instant where one metric broke one rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RawViolation<'r> {
    pub node_id: String,
    pub metric: String,
    pub timestamp: DateTime<Utc>,
    pub observed_value: f64,
    /// Position of `rule` in the rule set.
    pub rule_index: usize,
    pub rule: &'r ThresholdRule,
}

impl RawViolation<'_> {
    pub fn key(&self) -> (&str, &str) {
        (&self.node_id, &self.metric)
    }
}

/// Evaluate every rule against every snapshot.
///
/// Rules are independent: a snapshot can yield several violations, including
/// several for the same metric. Rules whose metric a snapshot does not carry
/// are skipped. The result is ordered by timestamp, then rule position, then
/// metric name, then node id.
pub fn evaluate<'r>(snapshots: &[Snapshot], rules: &'r RuleSet) -> Vec<RawViolation<'r>> {
    let mut violations: Vec<RawViolation<'r>> = snapshots
        .par_iter()
        .flat_map_iter(|snapshot| evaluate_snapshot(snapshot, rules))
        .collect();

    violations.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.rule_index.cmp(&b.rule_index))
            .then_with(|| a.metric.cmp(&b.metric))
            .then_with(|| a.node_id.cmp(&b.node_id))
    });

    info!(
        snapshots = snapshots.len(),
        rules = rules.len(),
        violations = violations.len(),
        "Threshold evaluation complete"
    );
    violations
}

fn evaluate_snapshot<'r>(snapshot: &Snapshot, rules: &'r RuleSet) -> Vec<RawViolation<'r>> {
    let mut out = Vec::new();
    for (rule_index, rule) in rules.iter() {
        let Some(&value) = snapshot.metrics.get(&rule.metric) else {
            continue;
        };
        if rule.is_violated_by(value) {
            out.push(RawViolation {
                node_id: snapshot.node_id.clone(),
                metric: rule.metric.clone(),
                timestamp: snapshot.timestamp,
                observed_value: value,
                rule_index,
                rule,
            });
        }
    }
    out
}
