use super::stats::SampleBuffer;
use crate::ingest::Snapshot;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Rollup statistics for one (node, metric) group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateInsight {
    pub node_id: String,
    pub metric: String,
    pub count: usize,
    pub mean: f64,
    pub p95: f64,
    pub max: f64,
}

/// Group snapshot metrics by (node, metric) and summarize each group.
/// Output is ordered by node id, then metric.
pub fn aggregate(snapshots: &[Snapshot]) -> Vec<AggregateInsight> {
    let mut groups: BTreeMap<(&str, &str), SampleBuffer> = BTreeMap::new();
    for snapshot in snapshots {
        for (metric, &value) in &snapshot.metrics {
            groups
                .entry((snapshot.node_id.as_str(), metric.as_str()))
                .or_default()
                .push(value);
        }
    }

    let insights: Vec<AggregateInsight> = groups
        .into_iter()
        .collect::<Vec<_>>()
        .into_par_iter()
        .filter_map(|((node_id, metric), buffer)| {
            buffer.summarize().map(|s| AggregateInsight {
                node_id: node_id.to_string(),
                metric: metric.to_string(),
                count: s.count,
                mean: s.mean,
                p95: s.p95,
                max: s.max,
            })
        })
        .collect();

    info!(groups = insights.len(), "Rollup aggregation complete");
    insights
}

/// Look up the insight for a key in an `aggregate` result.
pub fn find<'a>(
    insights: &'a [AggregateInsight],
    node_id: &str,
    metric: &str,
) -> Option<&'a AggregateInsight> {
    insights
        .binary_search_by(|i| {
            i.node_id
                .as_str()
                .cmp(node_id)
                .then_with(|| i.metric.as_str().cmp(metric))
        })
        .ok()
        .map(|idx| &insights[idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn snap(node: &str, secs: i64, metrics: &[(&str, f64)]) -> Snapshot {
        Snapshot {
            node_id: node.to_string(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            metrics: metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            services: Default::default(),
        }
    }

    #[test]
    fn test_groups_per_node_and_metric() {
        let snaps = vec![
            snap("b", 0, &[("cpu", 10.0)]),
            snap("a", 0, &[("cpu", 50.0), ("mem", 1.0)]),
            snap("a", 60, &[("cpu", 70.0)]),
        ];
        let insights = aggregate(&snaps);
        let keys: Vec<(&str, &str)> = insights
            .iter()
            .map(|i| (i.node_id.as_str(), i.metric.as_str()))
            .collect();
        assert_eq!(keys, vec![("a", "cpu"), ("a", "mem"), ("b", "cpu")]);

        let a_cpu = find(&insights, "a", "cpu").unwrap();
        assert_eq!(a_cpu.count, 2);
        assert_eq!(a_cpu.mean, 60.0);
        assert_eq!(a_cpu.p95, 70.0);
        assert_eq!(a_cpu.max, 70.0);
        assert!(find(&insights, "c", "cpu").is_none());
    }

    #[test]
    fn test_processing_order_independent() {
        let mut snaps: Vec<Snapshot> = (0..50)
            .map(|i| snap(&format!("n{}", i % 3), i, &[("lat", (i * 37 % 101) as f64 / 3.0)]))
            .collect();
        let forward = aggregate(&snaps);
        snaps.reverse();
        assert_eq!(forward, aggregate(&snaps));
    }
}
