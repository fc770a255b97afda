//! Telemetry sink — receives the reporting fields of accepted requests.
//! Nothing recorded here feeds back into entitlement decisions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use entitlement_core::config::TelemetryConfig;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::request::{EventType, TelemetryReport};

pub trait TelemetrySink: Send + Sync + 'static {
    fn record(&self, report: TelemetryReport);
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn record(&self, _report: TelemetryReport) {}
}

/// Latest known state of one reporting instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSummary {
    pub instance_id: String,
    pub license_id: Option<Uuid>,
    pub license_checks: u64,
    pub telemetry_pings: u64,
    pub version: Option<String>,
    pub platform: Option<String>,
    pub arch: Option<String>,
    pub node_version: Option<String>,
    pub reported_tier: Option<String>,
    pub last_stats: BTreeMap<String, Value>,
    pub last_seen: DateTime<Utc>,
}

/// Aggregates reports per instance and per reported version.
///
/// Both maps are keyed by client-supplied strings, so each is capped. Once a cap
/// is reached, reports for unseen instances are dropped and unseen versions are
/// not counted; known entries keep updating.
pub struct InMemoryTelemetrySink {
    instances: DashMap<String, InstanceSummary>,
    versions: DashMap<String, u64>,
    max_stats_entries: usize,
    max_instances: usize,
    max_versions: usize,
    dropped: AtomicU64,
}

impl InMemoryTelemetrySink {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            instances: DashMap::new(),
            versions: DashMap::new(),
            max_stats_entries: config.max_stats_entries,
            max_instances: config.max_instances,
            max_versions: config.max_versions,
            dropped: AtomicU64::new(0),
        }
    }

    /// Reports discarded because the instance table was full.
    pub fn dropped_reports(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn instance(&self, instance_id: &str) -> Option<InstanceSummary> {
        self.instances.get(instance_id).map(|s| s.clone())
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Number of reports seen per version string.
    pub fn version_counts(&self) -> BTreeMap<String, u64> {
        self.versions
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

impl TelemetrySink for InMemoryTelemetrySink {
    fn record(&self, report: TelemetryReport) {
        // Sized before taking the entry: `len` locks every shard.
        let instances_full = self.instances.len() >= self.max_instances;
        let mut summary = match self.instances.entry(report.instance_id.clone()) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(_) if instances_full => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Entry::Vacant(entry) => entry.insert(InstanceSummary {
                instance_id: report.instance_id.clone(),
                license_id: None,
                license_checks: 0,
                telemetry_pings: 0,
                version: None,
                platform: None,
                arch: None,
                node_version: None,
                reported_tier: None,
                last_stats: BTreeMap::new(),
                last_seen: Utc::now(),
            }),
        };

        if let Some(version) = &report.version {
            if let Some(mut count) = self.versions.get_mut(version) {
                *count += 1;
            } else if self.versions.len() < self.max_versions {
                *self.versions.entry(version.clone()).or_insert(0) += 1;
            }
        }

        let stats: BTreeMap<String, Value> = report
            .stats
            .into_iter()
            .take(self.max_stats_entries)
            .collect();

        match report.event_type {
            EventType::LicenseCheck => summary.license_checks += 1,
            EventType::TelemetryPing => summary.telemetry_pings += 1,
        }
        if report.license_id.is_some() {
            summary.license_id = report.license_id;
        }
        if report.version.is_some() {
            summary.version = report.version;
        }
        if report.platform.is_some() {
            summary.platform = report.platform;
        }
        if report.arch.is_some() {
            summary.arch = report.arch;
        }
        if report.node_version.is_some() {
            summary.node_version = report.node_version;
        }
        if report.reported_tier.is_some() {
            summary.reported_tier = report.reported_tier;
        }
        if !stats.is_empty() {
            summary.last_stats = stats;
        }
        summary.last_seen = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::EntitlementRequest;
    use serde_json::json;

    fn default_sink() -> InMemoryTelemetrySink {
        InMemoryTelemetrySink::new(&TelemetryConfig::default())
    }

    fn ping(instance: &str, version: &str) -> TelemetryReport {
        let mut req = EntitlementRequest::telemetry_ping(instance);
        req.version = Some(version.to_string());
        req.telemetry_report()
    }

    #[test]
    fn test_aggregates_per_instance_and_version() {
        let sink = default_sink();
        sink.record(ping("inst-a", "0.4.0"));
        sink.record(ping("inst-a", "0.4.1"));
        sink.record(ping("inst-b", "0.4.1"));

        assert_eq!(sink.instance_count(), 2);
        let a = sink.instance("inst-a").unwrap();
        assert_eq!(a.telemetry_pings, 2);
        assert_eq!(a.version.as_deref(), Some("0.4.1"));

        let versions = sink.version_counts();
        assert_eq!(versions.get("0.4.0"), Some(&1));
        assert_eq!(versions.get("0.4.1"), Some(&2));
    }

    #[test]
    fn test_license_checks_counted_separately() {
        let sink = default_sink();
        let mut report =
            EntitlementRequest::license_check("inst-c", "bdb_live_0123456789").telemetry_report();
        let license_id = Uuid::new_v4();
        report.license_id = Some(license_id);
        sink.record(report);

        let summary = sink.instance("inst-c").unwrap();
        assert_eq!(summary.license_checks, 1);
        assert_eq!(summary.telemetry_pings, 0);
        assert_eq!(summary.license_id, Some(license_id));
    }

    #[test]
    fn test_stats_truncated() {
        let sink = InMemoryTelemetrySink::new(&TelemetryConfig {
            max_stats_entries: 2,
            ..TelemetryConfig::default()
        });
        let mut report = ping("inst-d", "0.5.0");
        report.stats = (0..5).map(|i| (format!("k{i}"), json!(i))).collect();
        sink.record(report);

        assert_eq!(sink.instance("inst-d").unwrap().last_stats.len(), 2);
    }

    #[test]
    fn test_instance_table_is_capped() {
        let sink = InMemoryTelemetrySink::new(&TelemetryConfig {
            max_instances: 2,
            ..TelemetryConfig::default()
        });
        sink.record(ping("inst-1", "0.4.0"));
        sink.record(ping("inst-2", "0.4.0"));
        sink.record(ping("inst-3", "0.4.0"));
        sink.record(ping("inst-1", "0.4.0"));

        assert_eq!(sink.instance_count(), 2);
        assert!(sink.instance("inst-3").is_none());
        assert_eq!(sink.instance("inst-1").unwrap().telemetry_pings, 2);
        assert_eq!(sink.dropped_reports(), 1);
        assert_eq!(sink.version_counts().get("0.4.0"), Some(&3));
    }

    #[test]
    fn test_version_table_is_capped() {
        let sink = InMemoryTelemetrySink::new(&TelemetryConfig {
            max_versions: 1,
            ..TelemetryConfig::default()
        });
        sink.record(ping("inst-1", "0.4.0"));
        sink.record(ping("inst-2", "0.9.9-random"));
        sink.record(ping("inst-2", "0.4.0"));

        let versions = sink.version_counts();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions.get("0.4.0"), Some(&2));
        assert_eq!(sink.instance_count(), 2);
        assert_eq!(sink.dropped_reports(), 0);
    }

    #[test]
    fn test_noop_sink_accepts_reports() {
        NoopTelemetrySink.record(ping("inst-e", "0.1.0"));
    }
}
