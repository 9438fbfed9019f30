//! Enrichment seam: a downstream stage (typically a language model) turns
//! each ranked incident into a free-text recommendation.
//!
//! The core only hands out structured context and takes an optional string
//! back. A failing enricher never fails the run; the incident simply stays
//! unannotated.

use crate::analysis::{rollup, AggregateInsight};
use crate::detect::{RankedIncident, Severity};
use crate::report::RankedReport;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

/// Everything an enricher may look at for one incident.
#[derive(Debug, Clone, Copy)]
pub struct IncidentContext<'a> {
    pub ranked: &'a RankedIncident,
    /// Rollup for the incident's node metric, if the batch produced one.
    pub insight: Option<&'a AggregateInsight>,
}

#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &str;

    async fn annotate(&self, ctx: &IncidentContext<'_>) -> Result<Option<String>>;
}

/// Leaves every incident unannotated.
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    fn name(&self) -> &str {
        "none"
    }

    async fn annotate(&self, _ctx: &IncidentContext<'_>) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Canned remediation advice keyed on the metric family. Used where no
/// model-backed enricher is wired in.
pub struct PlaybookEnricher;

impl PlaybookEnricher {
    fn advice(metric: &str) -> &'static str {
        let m = metric.to_ascii_lowercase();
        if m.contains("cpu") {
            "Profile the hottest processes and scale out or raise CPU limits"
        } else if m.contains("mem") {
            "Check for leaks and tune cache sizes or memory limits"
        } else if m.contains("latency") {
            "Inspect slow queries and upstream dependencies; consider caching hot paths"
        } else if m.contains("error") {
            "Correlate with recent deploys and review failing endpoints"
        } else if m.contains("temp") {
            "Verify cooling and airflow; rebalance load away from the node"
        } else if m.contains("io_wait") || m.contains("disk") {
            "Look for saturated disks; move heavy I/O to faster storage"
        } else {
            "Investigate the node and compare against its recent baseline"
        }
    }

    fn urgency(severity: Severity) -> &'static str {
        match severity {
            Severity::Critical => "Immediate action",
            Severity::High => "Act today",
            Severity::Medium => "Plan a fix",
            Severity::Low => "Monitor",
        }
    }
}

#[async_trait]
impl Enricher for PlaybookEnricher {
    fn name(&self) -> &str {
        "playbook"
    }

    async fn annotate(&self, ctx: &IncidentContext<'_>) -> Result<Option<String>> {
        let inc = &ctx.ranked.incident;
        let mut note = format!(
            "{}: {} on {} peaked at {:.2} over {} occurrence{}. {}.",
            Self::urgency(ctx.ranked.severity),
            inc.metric,
            inc.node_id,
            inc.peak_value,
            inc.occurrence_count,
            if inc.occurrence_count == 1 { "" } else { "s" },
            Self::advice(&inc.metric),
        );
        if let Some(insight) = ctx.insight {
            note.push_str(&format!(
                " Batch mean {:.2}, p95 {:.2}.",
                insight.mean, insight.p95
            ));
        }
        Ok(Some(note))
    }
}

/// Annotations in flight at once when the caller has no preference.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Annotate every incident and return the annotated report. At most
/// `concurrency` annotations run at once; results keep report order.
pub async fn enrich(
    report: RankedReport,
    enricher: &dyn Enricher,
    concurrency: usize,
) -> RankedReport {
    let annotations = {
        let contexts: Vec<IncidentContext<'_>> = report
            .incidents
            .iter()
            .map(|ranked| IncidentContext {
                ranked,
                insight: rollup::find(
                    &report.insights,
                    &ranked.incident.node_id,
                    &ranked.incident.metric,
                ),
            })
            .collect();

        let results: Vec<Result<Option<String>>> = stream::iter(&contexts)
            .map(|ctx| enricher.annotate(ctx))
            .buffered(concurrency.max(1))
            .collect()
            .await;

        results
            .into_iter()
            .zip(&contexts)
            .map(|(result, ctx)| match result {
                Ok(note) => note,
                Err(e) => {
                    warn!(
                        enricher = enricher.name(),
                        incident = %ctx.ranked.incident.id,
                        error = %e,
                        "Enrichment failed, leaving incident unannotated"
                    );
                    None
                }
            })
            .collect::<Vec<_>>()
    };

    let annotated = annotations.iter().filter(|a| a.is_some()).count();
    info!(enricher = enricher.name(), annotated, "Enrichment complete");
    report.with_annotations(annotations)
}
