//! Entitlement resolution — tier model, key validation, license lookup and the
//! state machine that turns a license record into an entitlement decision.
//!
//! ## Components
//! - **tier** — tier hierarchy, gated features, instance and retention limits
//! - **validator** — syntactic checks on inbound license keys
//! - **request** — inbound request shape for `license_check` and `telemetry_ping`
//! - **lookup** — license lookup contract and the in-memory store
//! - **resolver** — deactivation/expiry/validity state machine
//! - **telemetry** — sink for pass-through reporting fields

#![warn(clippy::unwrap_used)]

pub mod lookup;
pub mod request;
pub mod resolver;
pub mod telemetry;
pub mod tier;
pub mod validator;

pub use lookup::{Customer, InMemoryLicenseStore, LicenseLookup, LicenseRecord, LookupError};
pub use request::{EntitlementRequest, EventType, TelemetryReport};
pub use resolver::{EntitlementResolver, EntitlementResult, LicenseState, Resolution};
pub use telemetry::{InMemoryTelemetrySink, NoopTelemetrySink, TelemetrySink};
pub use tier::{
    capabilities_for, features_for_tier, parse_tier, tier_allows, Feature, InstanceLimit,
    RetentionLimits, Tier, TierCapabilities,
};
pub use validator::KeyValidator;
