//! Snapshot validation: raw JSON records in, trusted snapshots out.
//!
//! A malformed record is skipped and reported as a [`Rejection`]; it never
//! stops the rest of the batch.

pub mod timestamp;

use crate::report::{serialize_display, OrderingStage, OrderingViolation};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info, warn};

const NODE_ID: &str = "node_id";
const TIMESTAMP: &str = "timestamp";
const METRICS: &str = "metrics";
const SERVICE_STATUS: &str = "service_status";

/// Per-record validation failures. Never fatal to the batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordValidationError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("node_id must be a non-empty string")]
    InvalidNodeId,

    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("'metrics' must be an object")]
    InvalidMetrics,

    #[error("metric '{metric}' is not numeric")]
    NonNumericMetric { metric: String },

    #[error("metric '{metric}' is not finite")]
    NonFiniteMetric { metric: String },

    #[error("service '{service}' has unknown status '{status}'")]
    InvalidServiceStatus { service: String, status: String },

    #[error("timestamp {found} precedes previous {previous} for this node")]
    NonMonotonicTimestamp {
        previous: DateTime<Utc>,
        found: DateTime<Utc>,
    },

    #[error("duplicate of an earlier record for this node and timestamp")]
    DuplicateRecord,
}

/// A skipped record, by position in the input batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub index: usize,
    pub node_id: Option<String>,
    #[serde(serialize_with = "serialize_display")]
    pub reason: RecordValidationError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Online,
    Degraded,
    Offline,
}

impl ServiceState {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Some(Self::Online),
            "degraded" => Some(Self::Degraded),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

/// One validated metrics reading for one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<String, f64>,
    pub services: BTreeMap<String, ServiceState>,
}

/// What to do with a record older than its node's previous record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingPolicy {
    /// Reject it as a validation error.
    #[default]
    Reject,
    /// Keep it, warn, and order snapshots by time.
    Sort,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    pub ordering: OrderingPolicy,
    /// Node id for records that carry none; `None` makes `node_id` required.
    pub default_node_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct IngestOutput {
    pub snapshots: Vec<Snapshot>,
    pub rejections: Vec<Rejection>,
    pub ordering_violations: Vec<OrderingViolation>,
}

/// Validate a batch of raw records.
pub fn validate_batch(records: &[Value], opts: &ValidationOptions) -> IngestOutput {
    let parsed: Vec<Result<Snapshot, Rejection>> = records
        .par_iter()
        .enumerate()
        .map(|(index, record)| {
            parse_record(record, opts).map_err(|reason| Rejection {
                index,
                node_id: peek_node_id(record, opts),
                reason,
            })
        })
        .collect();

    let mut out = IngestOutput::default();
    let mut last_seen: HashMap<String, DateTime<Utc>> = HashMap::new();
    let mut at_instant: HashMap<(String, DateTime<Utc>), Vec<usize>> = HashMap::new();

    for (index, result) in parsed.into_iter().enumerate() {
        let snapshot = match result {
            Ok(s) => s,
            Err(rejection) => {
                reject(&mut out, rejection);
                continue;
            }
        };

        let instant = (snapshot.node_id.clone(), snapshot.timestamp);
        let duplicate = at_instant
            .get(&instant)
            .is_some_and(|seen| seen.iter().any(|&i| out.snapshots[i] == snapshot));
        if duplicate {
            reject(
                &mut out,
                Rejection {
                    index,
                    node_id: Some(snapshot.node_id),
                    reason: RecordValidationError::DuplicateRecord,
                },
            );
            continue;
        }

        if let Some(&previous) = last_seen.get(&snapshot.node_id) {
            if snapshot.timestamp < previous {
                match opts.ordering {
                    OrderingPolicy::Reject => {
                        reject(
                            &mut out,
                            Rejection {
                                index,
                                node_id: Some(snapshot.node_id),
                                reason: RecordValidationError::NonMonotonicTimestamp {
                                    previous,
                                    found: snapshot.timestamp,
                                },
                            },
                        );
                        continue;
                    }
                    OrderingPolicy::Sort => {
                        warn!(
                            index,
                            node_id = %snapshot.node_id,
                            %previous,
                            found = %snapshot.timestamp,
                            "Snapshot out of time order for node"
                        );
                        out.ordering_violations.push(OrderingViolation {
                            stage: OrderingStage::Ingest,
                            node_id: snapshot.node_id.clone(),
                            metric: None,
                            record_index: Some(index),
                            previous,
                            found: snapshot.timestamp,
                        });
                    }
                }
            }
        }

        let newest = last_seen
            .entry(snapshot.node_id.clone())
            .or_insert(snapshot.timestamp);
        if snapshot.timestamp > *newest {
            *newest = snapshot.timestamp;
        }
        at_instant.entry(instant).or_default().push(out.snapshots.len());
        out.snapshots.push(snapshot);
    }

    if !out.ordering_violations.is_empty() {
        // Stable: equal timestamps keep input order.
        out.snapshots.sort_by_key(|s| s.timestamp);
    }

    info!(
        records = records.len(),
        accepted = out.snapshots.len(),
        rejected = out.rejections.len(),
        "Snapshot validation complete"
    );
    out
}

fn reject(out: &mut IngestOutput, rejection: Rejection) {
    debug!(
        index = rejection.index,
        node_id = ?rejection.node_id,
        reason = %rejection.reason,
        "Record rejected"
    );
    out.rejections.push(rejection);
}

fn peek_node_id(record: &Value, opts: &ValidationOptions) -> Option<String> {
    record
        .get(NODE_ID)
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| opts.default_node_id.clone())
}

/// Structural checks for a single record.
pub fn parse_record(
    record: &Value,
    opts: &ValidationOptions,
) -> Result<Snapshot, RecordValidationError> {
    let obj = record.as_object().ok_or(RecordValidationError::NotAnObject)?;

    let node_id = match obj.get(NODE_ID) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(_) => return Err(RecordValidationError::InvalidNodeId),
        None => opts
            .default_node_id
            .clone()
            .ok_or(RecordValidationError::MissingField(NODE_ID))?,
    };

    let raw_ts = obj
        .get(TIMESTAMP)
        .ok_or(RecordValidationError::MissingField(TIMESTAMP))?;
    let timestamp = timestamp::parse_timestamp(raw_ts)
        .ok_or_else(|| RecordValidationError::InvalidTimestamp(raw_ts.to_string()))?;

    let metrics = match obj.get(METRICS) {
        Some(Value::Object(m)) => parse_metrics(m.iter())?,
        Some(_) => return Err(RecordValidationError::InvalidMetrics),
        None => {
            let flat = parse_metrics(
                obj.iter()
                    .filter(|(k, _)| !matches!(k.as_str(), NODE_ID | TIMESTAMP | SERVICE_STATUS)),
            )?;
            if flat.is_empty() {
                return Err(RecordValidationError::MissingField(METRICS));
            }
            flat
        }
    };

    let services = match obj.get(SERVICE_STATUS) {
        Some(Value::Object(m)) => parse_services(m)?,
        Some(Value::Null) | None => BTreeMap::new(),
        Some(other) => {
            return Err(RecordValidationError::InvalidServiceStatus {
                service: SERVICE_STATUS.to_string(),
                status: other.to_string(),
            })
        }
    };

    Ok(Snapshot {
        node_id,
        timestamp,
        metrics,
        services,
    })
}

fn parse_metrics<'a>(
    fields: impl Iterator<Item = (&'a String, &'a Value)>,
) -> Result<BTreeMap<String, f64>, RecordValidationError> {
    let mut metrics = BTreeMap::new();
    for (name, value) in fields {
        let v = match value {
            Value::Number(n) => n.as_f64(),
            // Numeric strings are accepted, "NaN" and "inf" included, so
            // they can be rejected as non-finite below.
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| RecordValidationError::NonNumericMetric {
            metric: name.clone(),
        })?;
        if !v.is_finite() {
            return Err(RecordValidationError::NonFiniteMetric {
                metric: name.clone(),
            });
        }
        metrics.insert(name.clone(), v);
    }
    Ok(metrics)
}

fn parse_services(
    m: &Map<String, Value>,
) -> Result<BTreeMap<String, ServiceState>, RecordValidationError> {
    m.iter()
        .map(|(service, status)| {
            status
                .as_str()
                .and_then(ServiceState::parse)
                .map(|state| (service.clone(), state))
                .ok_or_else(|| RecordValidationError::InvalidServiceStatus {
                    service: service.clone(),
                    status: status.to_string(),
                })
        })
        .collect()
}
