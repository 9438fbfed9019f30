//! End-to-end properties of the analysis pipeline on synthetic batches.

use chrono::Duration;
use serde_json::{json, Value};
use slawatch::detect::{self, Comparator, IncidentStatus, RuleSet, Severity, ThresholdRule};
use slawatch::ingest::{self, ValidationOptions};
use slawatch::{Pipeline, SlawatchConfig};
use std::collections::HashMap;

const BASE: i64 = 1_709_294_400; // 2024-03-01T12:00:00Z

fn record(node: &str, minute: i64, metrics: Value) -> Value {
    json!({
        "node_id": node,
        "timestamp": BASE + minute * 60,
        "metrics": metrics,
    })
}

fn cpu_rule(limit: f64, severity: Severity) -> ThresholdRule {
    ThresholdRule::new("cpu", Comparator::GreaterThan, limit, severity)
}

fn pipeline(rules: Vec<ThresholdRule>, gap_minutes: i64) -> Pipeline {
    Pipeline::new(RuleSet::new(rules).unwrap(), Duration::minutes(gap_minutes)).unwrap()
}

/// A noisy multi-node batch: 40 nodes x 300 ticks = 12k records, with a
/// sprinkling of malformed entries.
fn large_batch() -> Vec<Value> {
    let mut records = Vec::new();
    for tick in 0..300i64 {
        for n in 0..40i64 {
            let node = format!("node-{:02}", n);
            let cpu = 50.0 + ((tick * 7 + n * 13) % 50) as f64;
            let latency = 100.0 + ((tick * 11 + n * 3) % 200) as f64;
            let err = ((tick + n) % 17) as f64 / 100.0;
            records.push(record(
                &node,
                tick,
                json!({"cpu_usage": cpu, "latency_ms": latency, "error_rate": err}),
            ));
        }
        if tick % 50 == 0 {
            records.push(json!({"node_id": "node-00", "timestamp": "not a time", "metrics": {}}));
        }
    }
    records
}

#[test]
fn test_worked_example_single_incident() {
    let records: Vec<Value> = [90.0, 92.0, 88.0, 70.0, 95.0]
        .iter()
        .enumerate()
        .map(|(i, v)| record("n1", i as i64, json!({"cpu": v})))
        .collect();

    let outcome = pipeline(vec![cpu_rule(85.0, Severity::High)], 2)
        .run(&records)
        .unwrap();
    let report = outcome.report;

    assert_eq!(report.summary.violations, 4);
    assert_eq!(report.incidents.len(), 1);
    let inc = &report.incidents[0].incident;
    assert_eq!(inc.node_id, "n1");
    assert_eq!(inc.occurrence_count, 4);
    assert_eq!(inc.peak_value, 95.0);
    assert_eq!(inc.base_severity, Severity::High);
    assert_eq!(inc.status, IncidentStatus::Closed);
    assert_eq!(inc.duration(), Duration::minutes(4));

    let insight = &report.insights[0];
    assert_eq!(insight.count, 5);
    assert_eq!(insight.mean, 87.0);
    assert_eq!(insight.p95, 95.0);
    assert_eq!(insight.max, 95.0);
}

#[test]
fn test_idempotent_report() {
    let records = large_batch();
    let cfg = SlawatchConfig::default();
    let first = slawatch::analyze(&records, &cfg).unwrap();
    let second = slawatch::analyze(&records, &cfg).unwrap();

    let a = serde_json::to_string(&first.report).unwrap();
    let b = serde_json::to_string(&second.report).unwrap();
    assert_eq!(a, b);
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(first.report.summary.rejected, 6);
}

#[test]
fn test_conservation_per_key() {
    let records = large_batch();
    let rules = RuleSet::sla_defaults();
    let ingested = ingest::validate_batch(&records, &ValidationOptions::default());
    let violations = detect::evaluate(&ingested.snapshots, &rules);

    let mut raw_per_key: HashMap<(String, String), u64> = HashMap::new();
    for v in &violations {
        *raw_per_key
            .entry((v.node_id.clone(), v.metric.clone()))
            .or_default() += 1;
    }

    let dedup = detect::deduplicate(&violations, Duration::minutes(2), 8);

    let mut incident_per_key: HashMap<(String, String), u64> = HashMap::new();
    for inc in &dedup.incidents {
        *incident_per_key
            .entry((inc.node_id.clone(), inc.metric.clone()))
            .or_default() += inc.occurrence_count;
    }
    assert_eq!(raw_per_key, incident_per_key);
    assert!(dedup.incidents.len() < violations.len());
}

#[test]
fn test_no_anomaly_explosion() {
    let records: Vec<Value> = (0..500)
        .map(|m| record("db-1", m, json!({"cpu": 99.0})))
        .collect();
    let report = pipeline(vec![cpu_rule(85.0, Severity::High)], 2)
        .run(&records)
        .unwrap()
        .report;
    assert_eq!(report.incidents.len(), 1);
    assert_eq!(report.incidents[0].incident.occurrence_count, 500);
}

#[test]
fn test_gap_splits_into_two_closed_incidents() {
    let mut records = Vec::new();
    for m in 0..5 {
        records.push(record("n1", m, json!({"cpu": 95.0})));
    }
    for m in 5..15 {
        records.push(record("n1", m, json!({"cpu": 20.0})));
    }
    for m in 15..18 {
        records.push(record("n1", m, json!({"cpu": 96.0})));
    }

    let report = pipeline(vec![cpu_rule(85.0, Severity::High)], 2)
        .run(&records)
        .unwrap()
        .report;
    assert_eq!(report.incidents.len(), 2);

    let mut incidents: Vec<_> = report.incidents.iter().map(|r| &r.incident).collect();
    incidents.sort_by_key(|i| i.first_seen);
    assert!(incidents.iter().all(|i| i.status == IncidentStatus::Closed));
    assert!(incidents[0].last_seen < incidents[1].first_seen);
    assert_eq!(incidents[0].occurrence_count, 5);
    assert_eq!(incidents[1].occurrence_count, 3);
}

#[test]
fn test_severity_never_downgrades_within_incident() {
    let values = [86.0, 97.0, 86.0, 86.0];
    let records: Vec<Value> = values
        .iter()
        .enumerate()
        .map(|(i, v)| record("n1", i as i64, json!({"cpu": v})))
        .collect();
    let report = pipeline(
        vec![cpu_rule(95.0, Severity::Critical), cpu_rule(85.0, Severity::High)],
        2,
    )
    .run(&records)
    .unwrap()
    .report;

    assert_eq!(report.incidents.len(), 1);
    assert_eq!(report.incidents[0].severity, Severity::Critical);
    // 4 high-rule hits + 1 critical-rule hit
    assert_eq!(report.incidents[0].incident.occurrence_count, 5);
}

#[test]
fn test_ranking_is_fully_determined() {
    // Same severity, same count, same duration: order falls to node, metric.
    let mut records = Vec::new();
    for node in ["zeta", "alpha", "mid"] {
        records.push(record(node, 0, json!({"cpu": 90.0, "mem": 90.0})));
    }
    let rules = vec![
        cpu_rule(85.0, Severity::High),
        ThresholdRule::new("mem", Comparator::GreaterEqual, 90.0, Severity::High),
    ];

    let forward = pipeline(rules.clone(), 2).run(&records).unwrap().report;
    records.reverse();
    let reversed = pipeline(rules, 2).run(&records).unwrap().report;
    assert_eq!(forward, reversed);

    let keys: Vec<(String, String)> = forward
        .incidents
        .iter()
        .map(|r| (r.incident.node_id.clone(), r.incident.metric.clone()))
        .collect();
    let expected: Vec<(String, String)> = [
        ("alpha", "cpu"),
        ("alpha", "mem"),
        ("mid", "cpu"),
        ("mid", "mem"),
        ("zeta", "cpu"),
        ("zeta", "mem"),
    ]
    .iter()
    .map(|(n, m)| (n.to_string(), m.to_string()))
    .collect();
    assert_eq!(keys, expected);
}

#[test]
fn test_severity_outranks_frequency() {
    let mut records = Vec::new();
    for m in 0..20 {
        records.push(record("busy", m, json!({"cpu": 80.0})));
    }
    records.push(record("quiet", 0, json!({"cpu": 99.0})));
    let report = pipeline(
        vec![cpu_rule(95.0, Severity::Critical), cpu_rule(75.0, Severity::Low)],
        2,
    )
    .run(&records)
    .unwrap()
    .report;
    assert_eq!(report.incidents[0].incident.node_id, "quiet");
    assert_eq!(report.incidents[0].severity, Severity::Critical);
    assert_eq!(report.incidents[1].incident.node_id, "busy");
    assert_eq!(report.incidents[1].rank, 2);
}

#[test]
fn test_flat_single_host_format() {
    let raw = r#"[
      {"timestamp": "2023-10-01T12:00:00Z", "cpu_usage": 85, "memory_usage": 70,
       "latency_ms": 250, "error_rate": 0.02, "io_wait": 5,
       "service_status": {"database": "online", "api_gateway": "degraded", "cache": "online"}},
      {"timestamp": "2023-10-01T12:01:00Z", "cpu_usage": 92, "memory_usage": 82,
       "latency_ms": 300, "error_rate": 0.06, "io_wait": 12,
       "service_status": {"database": "offline", "api_gateway": "online", "cache": "online"}}
    ]"#;
    let records: Vec<Value> = serde_json::from_str(raw).unwrap();

    let mut cfg = SlawatchConfig::default();
    cfg.ingest.default_node_id = Some("srv-01".to_string());
    let outcome = slawatch::analyze(&records, &cfg).unwrap();
    let report = outcome.report;

    assert!(outcome.diagnostics.is_clean());
    assert_eq!(report.summary.accepted, 2);
    assert_eq!(report.services.offline, vec!["database"]);
    assert_eq!(report.services.degraded, vec!["api_gateway"]);
    assert_eq!(report.services.online, vec!["cache"]);

    let metrics: Vec<&str> = report
        .incidents
        .iter()
        .map(|r| r.incident.metric.as_str())
        .collect();
    for m in ["cpu_usage", "memory_usage", "latency_ms", "error_rate", "io_wait"] {
        assert!(metrics.contains(&m), "missing incident for {m}");
    }
    assert!(report.incidents.iter().all(|r| r.incident.node_id == "srv-01"));
}

#[test]
fn test_empty_rule_set_is_fatal() {
    assert!(RuleSet::new(vec![]).is_err());
    let mut cfg = SlawatchConfig::default();
    cfg.engine.gap_tolerance_secs = 0;
    assert!(slawatch::analyze(&[record("n1", 0, json!({"cpu": 1}))], &cfg).is_err());
}

#[test]
fn test_distinct_records_at_one_instant_are_all_counted() {
    // Same node and instant, same cpu reading, different mem: two records.
    let first = record("n1", 0, json!({"cpu": 90, "mem": 1}));
    let second = record("n1", 0, json!({"cpu": 90, "mem": 2}));
    let records = vec![first.clone(), second, first, record("n1", 1, json!({"cpu": 91}))];

    let outcome = pipeline(vec![cpu_rule(85.0, Severity::High)], 2)
        .run(&records)
        .unwrap();
    let report = outcome.report;

    // Only the field-for-field copy of the first record is dropped.
    assert_eq!(report.summary.accepted, 3);
    assert_eq!(outcome.diagnostics.rejections.len(), 1);
    assert_eq!(outcome.diagnostics.rejections[0].index, 2);

    assert_eq!(report.summary.violations, 3);
    assert_eq!(report.incidents.len(), 1);
    assert_eq!(report.incidents[0].incident.occurrence_count, 3);
    assert_eq!(report.incidents[0].incident.peak_value, 91.0);
}
