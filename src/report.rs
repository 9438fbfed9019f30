//! The ranked report handed to enrichment and to the report writer, plus
//! run diagnostics and a human-readable summary.

use crate::analysis::{AggregateInsight, ServiceStatusSummary};
use crate::detect::{RankedIncident, Severity};
use crate::ingest::Rejection;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

pub(crate) fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: std::fmt::Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingStage {
    Ingest,
    Deduplication,
}

/// A data-quality warning: something arrived earlier than its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingViolation {
    pub stage: OrderingStage,
    pub node_id: String,
    pub metric: Option<String>,
    pub record_index: Option<usize>,
    pub previous: DateTime<Utc>,
    pub found: DateTime<Utc>,
}

/// Non-fatal problems collected over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub rejections: Vec<Rejection>,
    pub ordering_violations: Vec<OrderingViolation>,
}

impl Diagnostics {
    pub fn is_clean(&self) -> bool {
        self.rejections.is_empty() && self.ordering_violations.is_empty()
    }
}

/// Counters describing one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub records: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub violations: usize,
    pub incidents: usize,
    /// Incident count per severity tier; every tier is always present.
    pub incidents_by_severity: BTreeMap<Severity, usize>,
    pub ordering_warnings: usize,
}

impl RunSummary {
    pub fn count_tiers(incidents: &[RankedIncident]) -> BTreeMap<Severity, usize> {
        let mut tiers: BTreeMap<Severity, usize> = Severity::ALL.iter().map(|s| (*s, 0)).collect();
        for ranked in incidents {
            *tiers.entry(ranked.severity).or_default() += 1;
        }
        tiers
    }
}

/// The pipeline's terminal artifact. Field set and types are fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedReport {
    pub incidents: Vec<RankedIncident>,
    pub insights: Vec<AggregateInsight>,
    pub services: ServiceStatusSummary,
    pub summary: RunSummary,
}

impl RankedReport {
    /// Attach one annotation per incident, consuming the report.
    /// `annotations` is matched to incidents by position.
    pub fn with_annotations(mut self, annotations: Vec<Option<String>>) -> Self {
        for (ranked, note) in self.incidents.iter_mut().zip(annotations) {
            ranked.annotation = note;
        }
        self
    }
}

/// What the binary writes: the report plus the one run-varying field.
#[derive(Debug, Serialize)]
pub struct ReportEnvelope<'a> {
    pub generated_at: String,
    pub report: &'a RankedReport,
    pub diagnostics: &'a Diagnostics,
}

impl<'a> ReportEnvelope<'a> {
    pub fn new(report: &'a RankedReport, diagnostics: &'a Diagnostics) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            report,
            diagnostics,
        }
    }
}

/// Format a report as a short human-readable summary.
pub fn format_summary(report: &RankedReport, limit: usize) -> String {
    let s = &report.summary;
    let mut out = format!(
        "{} record{} ({} accepted, {} rejected), {} violation{}, {} incident{}\n",
        s.records,
        if s.records == 1 { "" } else { "s" },
        s.accepted,
        s.rejected,
        s.violations,
        if s.violations == 1 { "" } else { "s" },
        s.incidents,
        if s.incidents == 1 { "" } else { "s" },
    );

    let tiers: Vec<String> = Severity::ALL
        .iter()
        .map(|sev| format!("{}: {}", sev, s.incidents_by_severity.get(sev).unwrap_or(&0)))
        .collect();
    out.push_str(&format!("By severity: {}\n", tiers.join(", ")));

    if !report.incidents.is_empty() {
        out.push_str(&format!(
            "\n{:<4} | {:<8} | {:<16} | {:<20} | {:>5} | {:>10} | Window\n",
            "#", "Severity", "Node", "Metric", "Count", "Peak"
        ));
        out.push_str(&format!(
            "{:-<4}-|-{:-<8}-|-{:-<16}-|-{:-<20}-|-{:-<5}-|-{:-<10}-|-{:-<20}\n",
            "", "", "", "", "", "", ""
        ));
        for ranked in report.incidents.iter().take(limit) {
            let inc = &ranked.incident;
            out.push_str(&format!(
                "{:<4} | {:<8} | {:<16} | {:<20} | {:>5} | {:>10.2} | {} .. {}\n",
                ranked.rank,
                ranked.severity,
                inc.node_id,
                inc.metric,
                inc.occurrence_count,
                inc.peak_value,
                inc.first_seen.format("%Y-%m-%d %H:%M:%S"),
                inc.last_seen.format("%H:%M:%S"),
            ));
            if let Some(note) = &ranked.annotation {
                out.push_str(&format!("     -> {}\n", note));
            }
        }
        if report.incidents.len() > limit {
            out.push_str(&format!("... {} more\n", report.incidents.len() - limit));
        }
    }

    let svc = &report.services;
    if !(svc.online.is_empty() && svc.degraded.is_empty() && svc.offline.is_empty()) {
        out.push_str(&format!(
            "\nServices: online [{}], degraded [{}], offline [{}]\n",
            svc.online.join(", "),
            svc.degraded.join(", "),
            svc.offline.join(", "),
        ));
    }
    out
}
