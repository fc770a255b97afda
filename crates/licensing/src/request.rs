//! Inbound request shape shared by license checks and telemetry pings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LicenseCheck,
    TelemetryPing,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LicenseCheck => "license_check",
            Self::TelemetryPing => "telemetry_ping",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /v1/entitlements`.
///
/// `license_key` stays a raw JSON value so the validator can distinguish a
/// missing key from one of the wrong type. The remaining optional fields are
/// reporting data and never influence the entitlement decision.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_key: Option<Value>,
    pub instance_id: String,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_version: Option<String>,
    /// Tier the instance believes it runs at. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

impl std::fmt::Debug for EntitlementRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = match &self.license_key {
            Some(Value::String(key)) => Some(entitlement_core::redact_key(key)),
            Some(_) => Some("<non-string>".to_string()),
            None => None,
        };
        f.debug_struct("EntitlementRequest")
            .field("license_key", &key)
            .field("instance_id", &self.instance_id)
            .field("event_type", &self.event_type)
            .field("version", &self.version)
            .field("platform", &self.platform)
            .field("arch", &self.arch)
            .field("node_version", &self.node_version)
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}

impl EntitlementRequest {
    pub fn license_check(instance_id: impl Into<String>, license_key: impl Into<String>) -> Self {
        Self::telemetry_ping(instance_id)
            .with_license_key(license_key)
            .with_event_type(EventType::LicenseCheck)
    }

    /// Anonymous telemetry ping with no auxiliary fields.
    pub fn telemetry_ping(instance_id: impl Into<String>) -> Self {
        Self {
            license_key: None,
            instance_id: instance_id.into(),
            event_type: EventType::TelemetryPing,
            stats: None,
            version: None,
            platform: None,
            arch: None,
            node_version: None,
            tier: None,
        }
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    pub fn with_license_key(mut self, key: impl Into<String>) -> Self {
        self.license_key = Some(Value::String(key.into()));
        self
    }

    pub fn has_license_key(&self) -> bool {
        self.license_key.is_some()
    }

    /// Copy the pass-through reporting fields out of the request.
    pub fn telemetry_report(&self) -> TelemetryReport {
        TelemetryReport {
            instance_id: self.instance_id.clone(),
            event_type: self.event_type,
            license_id: None,
            version: self.version.clone(),
            platform: self.platform.clone(),
            arch: self.arch.clone(),
            node_version: self.node_version.clone(),
            reported_tier: self.tier.clone(),
            stats: self.stats.clone().unwrap_or_default(),
        }
    }
}

/// Reporting fields forwarded untouched to the telemetry sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReport {
    pub instance_id: String,
    pub event_type: EventType,
    pub license_id: Option<uuid::Uuid>,
    pub version: Option<String>,
    pub platform: Option<String>,
    pub arch: Option<String>,
    pub node_version: Option<String>,
    pub reported_tier: Option<String>,
    pub stats: BTreeMap<String, Value>,
}
