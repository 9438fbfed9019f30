use super::incident::Incident;
use super::Severity;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// An incident with its confirmed tier and 1-based position in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedIncident {
    pub rank: usize,
    pub severity: Severity,
    pub incident: Incident,
    /// Free-text recommendation supplied by an enrichment stage.
    pub annotation: Option<String>,
}

/// Total order used for the report: severity, occurrences and duration
/// descending, then node id, metric and opening time ascending.
pub fn compare(a: &Incident, b: &Incident) -> Ordering {
    b.base_severity
        .cmp(&a.base_severity)
        .then(b.occurrence_count.cmp(&a.occurrence_count))
        .then(b.duration().cmp(&a.duration()))
        .then_with(|| a.node_id.cmp(&b.node_id))
        .then_with(|| a.metric.cmp(&b.metric))
        .then(a.first_seen.cmp(&b.first_seen))
}

/// Order incidents for reporting. Nothing is filtered out.
pub fn rank(mut incidents: Vec<Incident>) -> Vec<RankedIncident> {
    incidents.sort_by(compare);
    incidents
        .into_iter()
        .enumerate()
        .map(|(i, incident)| RankedIncident {
            rank: i + 1,
            severity: incident.base_severity,
            incident,
            annotation: None,
        })
        .collect()
}
