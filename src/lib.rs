//! slawatch -- batch SLA analysis for infrastructure monitoring snapshots.
//!
//! This crate provides the deterministic analysis engine: snapshot
//! validation, per-node rollups, threshold evaluation, incident
//! deduplication and severity ranking, plus the enrichment seam and the
//! report model consumed by the `slawatch` binary.

pub mod analysis;
pub mod config;
pub mod detect;
pub mod enrich;
pub mod ingest;
pub mod pipeline;
pub mod report;

pub use config::{ConfigError, SlawatchConfig};
pub use pipeline::{AnalysisOutcome, Pipeline, PipelineError};
pub use report::{Diagnostics, RankedReport};

use serde_json::Value;

/// Validate, aggregate, evaluate, deduplicate and rank one batch using the
/// given configuration.
pub fn analyze(records: &[Value], cfg: &SlawatchConfig) -> Result<AnalysisOutcome, PipelineError> {
    let pipeline = Pipeline::from_config(cfg)?;
    pipeline.run(records)
}
