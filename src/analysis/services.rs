use crate::ingest::{ServiceState, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Services grouped by the worst state observed anywhere in the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatusSummary {
    pub online: Vec<String>,
    pub degraded: Vec<String>,
    pub offline: Vec<String>,
}

/// Offline beats degraded beats online. Lists come out sorted.
pub fn summarize(snapshots: &[Snapshot]) -> ServiceStatusSummary {
    let mut worst: BTreeMap<&str, ServiceState> = BTreeMap::new();
    for snapshot in snapshots {
        for (service, &state) in &snapshot.services {
            worst
                .entry(service.as_str())
                .and_modify(|w| *w = (*w).max(state))
                .or_insert(state);
        }
    }

    let mut summary = ServiceStatusSummary::default();
    for (service, state) in worst {
        let bucket = match state {
            ServiceState::Online => &mut summary.online,
            ServiceState::Degraded => &mut summary.degraded,
            ServiceState::Offline => &mut summary.offline,
        };
        bucket.push(service.to_string());
    }
    summary
}
