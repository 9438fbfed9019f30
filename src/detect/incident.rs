//! Temporal deduplication of raw violations into incidents.
//!
//! Each `(node_id, metric)` key has at most one open incident. A violation
//! that arrives within the gap tolerance of the key's last violation extends
//! the open incident; a longer gap closes it and opens a new one. Whatever is
//! still open when the stream ends is closed with [`CloseReason::EndOfBatch`].

use super::evaluator::RawViolation;
use super::Severity;
use crate::report::{OrderingStage, OrderingViolation};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Namespace for incident IDs; an ID is a v5 UUID over the key and the
/// opening timestamp, so independent shards can never collide.
const INCIDENT_NAMESPACE: Uuid = Uuid::from_u128(0x6d1f_0c2e_4b8a_5e97_a3c4_71d2_9b0e_5f18);

pub type IncidentKey = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// A later violation arrived after more than the gap tolerance.
    GapExceeded,
    /// The condition was still ongoing when the batch ended.
    EndOfBatch,
}

/// A deduplicated, time-bounded violation condition on one node metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub node_id: String,
    pub metric: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrence_count: u64,
    pub peak_value: f64,
    pub base_severity: Severity,
    pub status: IncidentStatus,
    pub close_reason: Option<CloseReason>,
}

impl Incident {
    pub fn incident_id(node_id: &str, metric: &str, first_seen: DateTime<Utc>) -> Uuid {
        let name = format!(
            "{}\u{1f}{}\u{1f}{}",
            node_id,
            metric,
            first_seen.to_rfc3339_opts(SecondsFormat::Nanos, true)
        );
        Uuid::new_v5(&INCIDENT_NAMESPACE, name.as_bytes())
    }

    pub fn duration(&self) -> Duration {
        self.last_seen - self.first_seen
    }

    pub fn is_open(&self) -> bool {
        self.status == IncidentStatus::Open
    }
}

impl Incident {
    fn start(v: &RawViolation<'_>) -> Self {
        debug!(node_id = %v.node_id, metric = %v.metric, at = %v.timestamp, "Opening incident");
        Self {
            id: Self::incident_id(&v.node_id, &v.metric, v.timestamp),
            node_id: v.node_id.clone(),
            metric: v.metric.clone(),
            first_seen: v.timestamp,
            last_seen: v.timestamp,
            occurrence_count: 1,
            peak_value: v.observed_value,
            base_severity: v.rule.severity,
            status: IncidentStatus::Open,
            close_reason: None,
        }
    }

    /// Every violation counts, including several at the same instant.
    fn absorb(&mut self, v: &RawViolation<'_>) {
        if v.timestamp > self.last_seen {
            self.last_seen = v.timestamp;
        }
        self.occurrence_count += 1;
        if v.observed_value > self.peak_value {
            self.peak_value = v.observed_value;
        }
        // Severity only ever escalates while open.
        if v.rule.severity > self.base_severity {
            self.base_severity = v.rule.severity;
        }
    }

    fn close(mut self, reason: CloseReason) -> Self {
        self.status = IncidentStatus::Closed;
        self.close_reason = Some(reason);
        debug!(
            node_id = %self.node_id,
            metric = %self.metric,
            occurrences = self.occurrence_count,
            ?reason,
            "Closing incident"
        );
        self
    }
}

enum Step {
    Open,
    Extend,
    Split,
    OutOfOrder(DateTime<Utc>),
}

/// Stateful fold of a time-ordered violation stream.
pub struct Deduplicator {
    gap_tolerance: Duration,
    open: HashMap<IncidentKey, Incident>,
    closed: Vec<Incident>,
    ordering_violations: Vec<OrderingViolation>,
}

impl Deduplicator {
    pub fn new(gap_tolerance: Duration) -> Self {
        Self {
            gap_tolerance,
            open: HashMap::new(),
            closed: Vec::new(),
            ordering_violations: Vec::new(),
        }
    }

    pub fn ingest(&mut self, v: &RawViolation<'_>) {
        let key = (v.node_id.clone(), v.metric.clone());

        let step = match self.open.get(&key) {
            None => Step::Open,
            Some(cur) if v.timestamp < cur.last_seen => Step::OutOfOrder(cur.last_seen),
            Some(cur) if v.timestamp - cur.last_seen > self.gap_tolerance => Step::Split,
            Some(_) => Step::Extend,
        };

        match step {
            Step::Open => {
                self.open.insert(key, Incident::start(v));
            }
            Step::Extend => {
                if let Some(cur) = self.open.get_mut(&key) {
                    cur.absorb(v);
                }
            }
            Step::Split => {
                if let Some(stale) = self.open.remove(&key) {
                    self.closed.push(stale.close(CloseReason::GapExceeded));
                }
                self.open.insert(key, Incident::start(v));
            }
            Step::OutOfOrder(previous) => {
                warn!(
                    node_id = %v.node_id,
                    metric = %v.metric,
                    %previous,
                    found = %v.timestamp,
                    "Violation out of time order, rejected"
                );
                self.ordering_violations.push(OrderingViolation {
                    stage: OrderingStage::Deduplication,
                    node_id: v.node_id.clone(),
                    metric: Some(v.metric.clone()),
                    record_index: None,
                    previous,
                    found: v.timestamp,
                });
            }
        }
    }

    /// Incidents currently open, ordered by key.
    pub fn open_incidents(&self) -> Vec<&Incident> {
        let mut open: Vec<&Incident> = self.open.values().collect();
        open.sort_by(|a, b| a.node_id.cmp(&b.node_id).then_with(|| a.metric.cmp(&b.metric)));
        open
    }

    /// Close everything still open and hand over the incidents, ordered by
    /// `(node_id, metric, first_seen)`.
    pub fn finish(mut self) -> DedupOutput {
        let still_open = std::mem::take(&mut self.open);
        self.closed.extend(
            still_open
                .into_values()
                .map(|i| i.close(CloseReason::EndOfBatch)),
        );
        let mut output = DedupOutput {
            incidents: self.closed,
            ordering_violations: self.ordering_violations,
        };
        output.sort();
        output
    }
}

#[derive(Debug, Default)]
pub struct DedupOutput {
    pub incidents: Vec<Incident>,
    pub ordering_violations: Vec<OrderingViolation>,
}

impl DedupOutput {
    fn sort(&mut self) {
        self.incidents.sort_by(|a, b| {
            a.node_id
                .cmp(&b.node_id)
                .then_with(|| a.metric.cmp(&b.metric))
                .then(a.first_seen.cmp(&b.first_seen))
        });
        self.ordering_violations.sort_by(|a, b| {
            a.node_id
                .cmp(&b.node_id)
                .then_with(|| a.metric.cmp(&b.metric))
                .then(a.found.cmp(&b.found))
        });
    }

    fn merge(parts: Vec<DedupOutput>) -> DedupOutput {
        let mut merged = DedupOutput::default();
        for part in parts {
            merged.incidents.extend(part.incidents);
            merged.ordering_violations.extend(part.ordering_violations);
        }
        merged.sort();
        merged
    }
}

fn shard_of(node_id: &str, metric: &str, shards: usize) -> usize {
    // DefaultHasher::new() uses fixed keys, so assignment is stable.
    let mut hasher = DefaultHasher::new();
    node_id.hash(&mut hasher);
    metric.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

/// Deduplicate a time-ordered violation stream, sharded on
/// `(node_id, metric)`. Each shard owns a disjoint key subset and runs its
/// own [`Deduplicator`]; the merged output does not depend on `shards`.
pub fn deduplicate(
    violations: &[RawViolation<'_>],
    gap_tolerance: Duration,
    shards: usize,
) -> DedupOutput {
    let shards = shards.max(1);
    let mut partitions: Vec<Vec<&RawViolation<'_>>> = vec![Vec::new(); shards];
    for v in violations {
        let (node_id, metric) = v.key();
        partitions[shard_of(node_id, metric, shards)].push(v);
    }

    let parts: Vec<DedupOutput> = partitions
        .into_par_iter()
        .map(|partition| {
            let mut dedup = Deduplicator::new(gap_tolerance);
            for v in partition {
                dedup.ingest(v);
            }
            dedup.finish()
        })
        .collect();

    let output = DedupOutput::merge(parts);
    info!(
        violations = violations.len(),
        incidents = output.incidents.len(),
        shards,
        "Deduplication complete"
    );
    output
}
