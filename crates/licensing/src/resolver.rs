//! Entitlement resolver — turns a license key and the current time into an entitlement decision.
//!
//! A lookup outcome is first classified into a [`LicenseState`]; each state has
//! exactly one transition to an [`EntitlementResult`] or an error. Precedence is
//! fixed by [`LicenseState::classify`]: a missing record beats everything,
//! deactivation beats expiry, expiry beats validity.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use entitlement_core::config::AppConfig;
use entitlement_core::{redact_key, EntitlementError, ResolveResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::lookup::{Customer, LicenseLookup, LicenseRecord};
use crate::request::{EntitlementRequest, EventType};
use crate::tier::{capabilities_for, parse_tier, Feature, InstanceLimit, RetentionLimits, Tier};
use crate::validator::KeyValidator;

pub const INVALID_LICENSE_KEY: &str = "Invalid license key";
pub const LICENSE_DEACTIVATED: &str = "License has been deactivated";
pub const LICENSE_EXPIRED: &str = "License has expired";

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Resolved entitlement returned to the caller. Built fresh per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementResult {
    pub valid: bool,
    pub tier: Tier,
    /// Present only when `valid` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeSet<Feature>>,
    pub instance_limit: InstanceLimit,
    pub retention_limits: RetentionLimits,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntitlementResult {
    /// Full entitlement for `tier`.
    fn granted(tier: Tier, expires_at: Option<DateTime<Utc>>, customer: Customer) -> Self {
        let caps = capabilities_for(tier);
        Self {
            valid: true,
            tier,
            features: Some(caps.features),
            instance_limit: caps.instance_limit,
            retention_limits: caps.retention,
            expires_at,
            customer: Some(customer),
            error: None,
        }
    }

    /// Community-level limits with no features.
    fn downgraded(expires_at: Option<DateTime<Utc>>, error: Option<&str>) -> Self {
        let caps = capabilities_for(Tier::Community);
        Self {
            valid: false,
            tier: Tier::Community,
            features: None,
            instance_limit: caps.instance_limit,
            retention_limits: caps.retention,
            expires_at,
            customer: None,
            error: error.map(str::to_string),
        }
    }

    /// Result for a keyless telemetry ping.
    pub fn anonymous() -> Self {
        Self::downgraded(None, None)
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features
            .as_ref()
            .map(|features| features.contains(&feature))
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Terminal state of one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseState {
    /// Keyless telemetry ping accepted without lookup.
    Anonymous,
    NotFound,
    Deactivated(LicenseRecord),
    Expired(LicenseRecord, DateTime<Utc>),
    Valid(LicenseRecord),
}

impl LicenseState {
    /// Classify a lookup outcome at instant `now`. An expiry equal to `now` is still valid.
    pub fn classify(record: Option<LicenseRecord>, now: DateTime<Utc>) -> Self {
        match record {
            None => Self::NotFound,
            Some(record) if !record.active => Self::Deactivated(record),
            Some(record) => match record.expires_at {
                Some(expires_at) if expires_at < now => Self::Expired(record, expires_at),
                _ => Self::Valid(record),
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::NotFound => "not_found",
            Self::Deactivated(_) => "deactivated",
            Self::Expired(..) => "expired",
            Self::Valid(_) => "valid",
        }
    }

    /// Produce the caller-facing outcome and emit the single diagnostic for this state.
    /// `key_prefix` is the redacted key and is only used when no record exists.
    pub fn into_result(self, key_prefix: &str) -> ResolveResult<EntitlementResult> {
        match self {
            Self::Anonymous => {
                debug!("Anonymous telemetry ping resolved without lookup");
                Ok(EntitlementResult::anonymous())
            }
            Self::NotFound => {
                warn!(key_prefix = %key_prefix, "License key not found");
                Err(EntitlementError::Authorization(
                    INVALID_LICENSE_KEY.to_string(),
                ))
            }
            Self::Deactivated(record) => {
                warn!(license_id = %record.id, "License is deactivated");
                Ok(EntitlementResult::downgraded(None, Some(LICENSE_DEACTIVATED)))
            }
            Self::Expired(record, expires_at) => {
                warn!(license_id = %record.id, expires_at = %expires_at, "License has expired");
                Ok(EntitlementResult::downgraded(
                    Some(expires_at),
                    Some(LICENSE_EXPIRED),
                ))
            }
            Self::Valid(record) => {
                let tier = parse_tier(&record.tier);
                if tier.as_str() == record.tier {
                    info!(license_id = %record.id, tier = %tier, "License validated");
                } else {
                    warn!(
                        license_id = %record.id,
                        tier = %tier,
                        stored_tier = %record.tier,
                        "License validated with unrecognized stored tier, degraded to community"
                    );
                }
                Ok(EntitlementResult::granted(
                    tier,
                    record.expires_at,
                    record.customer,
                ))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Outcome of a handled request together with the license it resolved against.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub result: EntitlementResult,
    pub license_id: Option<uuid::Uuid>,
    pub state: &'static str,
}

/// Stateless resolver. Holds only construction-time configuration and the
/// lookup collaborator; concurrent calls share nothing mutable.
pub struct EntitlementResolver {
    lookup: Arc<dyn LicenseLookup>,
    validator: KeyValidator,
    allow_anonymous_pings: bool,
}

impl EntitlementResolver {
    pub fn new(
        lookup: Arc<dyn LicenseLookup>,
        validator: KeyValidator,
        allow_anonymous_pings: bool,
    ) -> Self {
        Self {
            lookup,
            validator,
            allow_anonymous_pings,
        }
    }

    pub fn from_config(lookup: Arc<dyn LicenseLookup>, config: &AppConfig) -> Self {
        Self::new(
            lookup,
            KeyValidator::new(&config.validation),
            config.telemetry.allow_anonymous_pings,
        )
    }

    /// Dispatch an inbound request by kind and resolve it at `now`.
    pub async fn handle(
        &self,
        request: &EntitlementRequest,
        now: DateTime<Utc>,
    ) -> ResolveResult<Resolution> {
        if request.event_type == EventType::TelemetryPing
            && !request.has_license_key()
            && self.allow_anonymous_pings
        {
            let state = LicenseState::Anonymous;
            let label = state.label();
            return Ok(Resolution {
                result: state.into_result("")?,
                license_id: None,
                state: label,
            });
        }

        let key = self
            .validator
            .validate(request.license_key.as_ref())
            .inspect_err(|e| {
                debug!(
                    instance_id = %request.instance_id,
                    event_type = %request.event_type,
                    error = %e,
                    "Rejected malformed license key"
                )
            })?;
        self.resolve_key(key, now).await
    }

    /// Resolve an already validated key. Performs exactly one lookup.
    pub async fn resolve_key(&self, key: &str, now: DateTime<Utc>) -> ResolveResult<Resolution> {
        let key_prefix = redact_key(key);
        let record = self.lookup.lookup(key).await.map_err(|e| {
            warn!(key_prefix = %key_prefix, error = %e, "License lookup failed");
            EntitlementError::Infrastructure(e.to_string())
        })?;

        let license_id = record.as_ref().map(|r| r.id);
        let state = LicenseState::classify(record, now);
        let label = state.label();
        Ok(Resolution {
            result: state.into_result(&key_prefix)?,
            license_id,
            state: label,
        })
    }

    /// Validate and resolve a bare key.
    pub async fn resolve(
        &self,
        raw_key: Option<&serde_json::Value>,
        now: DateTime<Utc>,
    ) -> ResolveResult<EntitlementResult> {
        let key = self.validator.validate(raw_key)?;
        Ok(self.resolve_key(key, now).await?.result)
    }
}
