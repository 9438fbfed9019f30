//! Wires the stages into one batch run:
//! validate -> {rollup, evaluate, service summary} -> deduplicate -> rank.

use crate::analysis::{self, services};
use crate::config::{ConfigError, SlawatchConfig};
use crate::detect::{self, RuleSet};
use crate::ingest::{self, ValidationOptions};
use crate::report::{Diagnostics, RankedReport, RunSummary};
use chrono::Duration;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// A complete run: the report plus everything non-fatal that went wrong.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub report: RankedReport,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    rules: RuleSet,
    gap_tolerance: Duration,
    validation: ValidationOptions,
    shards: usize,
    workers: usize,
}

impl Pipeline {
    pub fn new(rules: RuleSet, gap_tolerance: Duration) -> Result<Self, ConfigError> {
        if gap_tolerance <= Duration::zero() {
            return Err(ConfigError::ZeroGapTolerance);
        }
        Ok(Self {
            rules,
            gap_tolerance,
            validation: ValidationOptions::default(),
            shards: 1,
            workers: 0,
        })
    }

    pub fn from_config(cfg: &SlawatchConfig) -> Result<Self, ConfigError> {
        let rules = cfg.validate()?;
        Ok(Self::new(rules, cfg.engine.gap_tolerance())?
            .with_validation(cfg.validation_options())
            .with_shards(cfg.engine.shards)
            .with_workers(cfg.engine.workers))
    }

    pub fn with_validation(mut self, validation: ValidationOptions) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards.max(1);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Run the whole batch. Only pool start-up can fail here; record-level
    /// problems end up in the outcome's diagnostics.
    pub fn run(&self, records: &[Value]) -> Result<AnalysisOutcome, PipelineError> {
        if self.workers == 0 {
            return Ok(self.run_stages(records));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()?;
        Ok(pool.install(|| self.run_stages(records)))
    }

    fn run_stages(&self, records: &[Value]) -> AnalysisOutcome {
        info!(
            records = records.len(),
            rules = self.rules.len(),
            gap_tolerance_secs = self.gap_tolerance.num_seconds(),
            "Starting analysis run"
        );

        let ingested = ingest::validate_batch(records, &self.validation);
        let snapshots = &ingested.snapshots;

        let ((insights, services), violations) = rayon::join(
            || (analysis::aggregate(snapshots), services::summarize(snapshots)),
            || detect::evaluate(snapshots, &self.rules),
        );

        let dedup = detect::deduplicate(&violations, self.gap_tolerance, self.shards);
        let incidents = detect::rank(dedup.incidents);

        let mut diagnostics = Diagnostics {
            rejections: ingested.rejections,
            ordering_violations: ingested.ordering_violations,
        };
        diagnostics.ordering_violations.extend(dedup.ordering_violations);

        let summary = RunSummary {
            records: records.len(),
            accepted: snapshots.len(),
            rejected: diagnostics.rejections.len(),
            violations: violations.len(),
            incidents: incidents.len(),
            incidents_by_severity: RunSummary::count_tiers(&incidents),
            ordering_warnings: diagnostics.ordering_violations.len(),
        };

        if !diagnostics.is_clean() {
            warn!(
                rejected = summary.rejected,
                ordering_warnings = summary.ordering_warnings,
                "Run finished with data-quality diagnostics"
            );
        }
        info!(
            accepted = summary.accepted,
            violations = summary.violations,
            incidents = summary.incidents,
            "Analysis run complete"
        );

        AnalysisOutcome {
            report: RankedReport {
                incidents,
                insights,
                services,
                summary,
            },
            diagnostics,
        }
    }
}
