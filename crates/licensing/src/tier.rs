//! Tier model — the fixed tier hierarchy and the capabilities each tier unlocks.
//!
//! Community (free): no gated features, a single instance, short retention.
//! Pro: key analytics, anomaly detection, alerting, multi-instance.
//! Enterprise: everything, unlimited instances, one year of retention.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// Subscription tier, ordered by entitlement breadth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Community,
    Pro,
    Enterprise,
}

impl Tier {
    /// All tiers, lowest first.
    pub const ALL: [Tier; 3] = [Self::Community, Self::Pro, Self::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Community => "community",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn capabilities(&self) -> TierCapabilities {
        capabilities_for(*self)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTier(pub String);

impl std::fmt::Display for UnknownTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown tier `{}`", self.0)
    }
}

impl std::error::Error for UnknownTier {}

impl FromStr for Tier {
    type Err = UnknownTier;

    /// Strict parse. Use [`parse_tier`] for the degrading variant applied to stored records.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "community" => Ok(Self::Community),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

/// Coerce a raw stored tier string into a [`Tier`], falling back to `fallback`
/// for anything that is not one of the three literal names.
pub fn parse_tier_or(raw: &str, fallback: Tier) -> Tier {
    raw.parse().unwrap_or(fallback)
}

/// [`parse_tier_or`] with the community fallback. Never fails.
pub fn parse_tier(raw: &str) -> Tier {
    parse_tier_or(raw, Tier::Community)
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

/// Every gated product capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    // ── Pro ────────────────────────────────────────────────────
    KeyAnalytics,
    AnomalyDetection,
    Alerting,
    MultiInstance,

    // ── Enterprise ─────────────────────────────────────────────
    Workspaces,
    SsoSaml,
    ComplianceExport,
    Rbac,
    CloudAi,
}

impl Feature {
    pub const ALL: [Feature; 9] = [
        Self::KeyAnalytics,
        Self::AnomalyDetection,
        Self::Alerting,
        Self::MultiInstance,
        Self::Workspaces,
        Self::SsoSaml,
        Self::ComplianceExport,
        Self::Rbac,
        Self::CloudAi,
    ];

    /// Lowest tier that unlocks this feature.
    pub fn min_tier(&self) -> Tier {
        match self {
            Self::KeyAnalytics | Self::AnomalyDetection | Self::Alerting | Self::MultiInstance => {
                Tier::Pro
            }

            Self::Workspaces
            | Self::SsoSaml
            | Self::ComplianceExport
            | Self::Rbac
            | Self::CloudAi => Tier::Enterprise,
        }
    }

    /// Wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyAnalytics => "keyAnalytics",
            Self::AnomalyDetection => "anomalyDetection",
            Self::Alerting => "alerting",
            Self::MultiInstance => "multiInstance",
            Self::Workspaces => "workspaces",
            Self::SsoSaml => "ssoSaml",
            Self::ComplianceExport => "complianceExport",
            Self::Rbac => "rbac",
            Self::CloudAi => "cloudAi",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::KeyAnalytics => "Keyspace analytics and hot-key tracking",
            Self::AnomalyDetection => "Anomaly detection on instance metrics",
            Self::Alerting => "Threshold and anomaly alerting",
            Self::MultiInstance => "Monitoring of multiple instances from one deployment",
            Self::Workspaces => "Shared team workspaces",
            Self::SsoSaml => "SSO via SAML identity providers",
            Self::ComplianceExport => "Audit and compliance data export",
            Self::Rbac => "Role-based access control",
            Self::CloudAi => "Hosted AI assistant",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check if a tier grants access to a feature.
pub fn tier_allows(tier: Tier, feature: Feature) -> bool {
    tier >= feature.min_tier()
}

/// All features available at a given tier.
pub fn features_for_tier(tier: Tier) -> BTreeSet<Feature> {
    Feature::ALL
        .iter()
        .copied()
        .filter(|f| tier_allows(tier, *f))
        .collect()
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum concurrent instances under one license. `Unlimited` orders above every bound
/// and serializes as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstanceLimit {
    Limited(u32),
    Unlimited,
}

impl InstanceLimit {
    pub fn permits(&self, instances: u32) -> bool {
        match self {
            Self::Limited(max) => instances <= *max,
            Self::Unlimited => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionLimits {
    pub data_retention_days: u32,
    pub acl_retention_hours: u32,
}

/// Everything a tier unlocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierCapabilities {
    pub features: BTreeSet<Feature>,
    pub instance_limit: InstanceLimit,
    pub retention: RetentionLimits,
}

pub fn instance_limit_for(tier: Tier) -> InstanceLimit {
    match tier {
        Tier::Community => InstanceLimit::Limited(1),
        Tier::Pro => InstanceLimit::Limited(10),
        Tier::Enterprise => InstanceLimit::Unlimited,
    }
}

pub fn retention_for(tier: Tier) -> RetentionLimits {
    match tier {
        Tier::Community => RetentionLimits {
            data_retention_days: 7,
            acl_retention_hours: 24,
        },
        Tier::Pro => RetentionLimits {
            data_retention_days: 90,
            acl_retention_hours: 2160,
        },
        Tier::Enterprise => RetentionLimits {
            data_retention_days: 365,
            acl_retention_hours: 8760,
        },
    }
}

pub fn capabilities_for(tier: Tier) -> TierCapabilities {
    TierCapabilities {
        features: features_for_tier(tier),
        instance_limit: instance_limit_for(tier),
        retention: retention_for(tier),
    }
}

/// A pair of adjacent tiers whose capabilities shrink when moving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonotonicityViolation {
    pub lower: Tier,
    pub higher: Tier,
    pub reason: &'static str,
}

impl std::fmt::Display for MonotonicityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}: {}", self.lower, self.higher, self.reason)
    }
}

impl std::error::Error for MonotonicityViolation {}

/// Check that features, instance limits and retention windows never decrease with tier,
/// and that community unlocks no features.
pub fn verify_monotonic() -> Result<(), MonotonicityViolation> {
    if !capabilities_for(Tier::Community).features.is_empty() {
        return Err(MonotonicityViolation {
            lower: Tier::Community,
            higher: Tier::Community,
            reason: "community must not unlock gated features",
        });
    }

    for pair in Tier::ALL.windows(2) {
        let (lower, higher) = (pair[0], pair[1]);
        let lo = capabilities_for(lower);
        let hi = capabilities_for(higher);

        let reason = if !lo.features.is_subset(&hi.features) {
            Some("feature set shrinks")
        } else if lo.instance_limit > hi.instance_limit {
            Some("instance limit decreases")
        } else if lo.retention.data_retention_days > hi.retention.data_retention_days {
            Some("data retention decreases")
        } else if lo.retention.acl_retention_hours > hi.retention.acl_retention_hours {
            Some("ACL retention decreases")
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(MonotonicityViolation {
                lower,
                higher,
                reason,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Community < Tier::Pro);
        assert!(Tier::Pro < Tier::Enterprise);
    }

    #[test]
    fn test_community_has_no_features() {
        assert!(capabilities_for(Tier::Community).features.is_empty());
    }

    #[test]
    fn test_every_tier_is_subset_of_enterprise() {
        let enterprise = capabilities_for(Tier::Enterprise).features;
        assert_eq!(enterprise.len(), Feature::ALL.len());
        for tier in Tier::ALL {
            assert!(capabilities_for(tier).features.is_subset(&enterprise));
        }
    }

    #[test]
    fn test_pro_capabilities() {
        let pro = capabilities_for(Tier::Pro);
        assert_eq!(pro.instance_limit, InstanceLimit::Limited(10));
        assert_eq!(pro.retention.data_retention_days, 90);
        assert_eq!(pro.retention.acl_retention_hours, 2160);
        assert!(pro.features.contains(&Feature::KeyAnalytics));
        assert!(!pro.features.contains(&Feature::SsoSaml));
    }

    #[test]
    fn test_table_is_monotonic() {
        assert_eq!(verify_monotonic(), Ok(()));
    }

    #[test]
    fn test_unlimited_orders_above_any_bound() {
        assert!(InstanceLimit::Limited(u32::MAX) < InstanceLimit::Unlimited);
        assert!(InstanceLimit::Unlimited.permits(1_000_000));
        assert!(InstanceLimit::Limited(10).permits(10));
        assert!(!InstanceLimit::Limited(10).permits(11));
    }

    #[test]
    fn test_parse_tier_known_values() {
        assert_eq!(parse_tier("community"), Tier::Community);
        assert_eq!(parse_tier("pro"), Tier::Pro);
        assert_eq!(parse_tier("enterprise"), Tier::Enterprise);
    }

    #[test]
    fn test_parse_tier_degrades_to_community() {
        assert_eq!(parse_tier("gold"), Tier::Community);
        assert_eq!(parse_tier(""), Tier::Community);
        assert_eq!(parse_tier("PRO"), Tier::Community);
        assert_eq!(parse_tier_or("gold", Tier::Pro), Tier::Pro);
    }

    #[test]
    fn test_strict_parse_rejects_unknown() {
        assert_eq!("pro".parse::<Tier>(), Ok(Tier::Pro));
        assert!("gold".parse::<Tier>().is_err());
    }

    #[test]
    fn test_wire_names_match_serde() {
        for feature in Feature::ALL {
            let json = serde_json::to_string(&feature).unwrap();
            assert_eq!(json, format!("\"{}\"", feature.as_str()));
            assert!(!feature.description().is_empty());
        }
        for tier in Tier::ALL {
            let json = serde_json::to_string(&tier).unwrap();
            assert_eq!(json, format!("\"{}\"", tier.as_str()));
        }
    }

    #[test]
    fn test_instance_limit_serialization() {
        assert_eq!(serde_json::to_string(&InstanceLimit::Limited(10)).unwrap(), "10");
        assert_eq!(serde_json::to_string(&InstanceLimit::Unlimited).unwrap(), "null");
        let parsed: InstanceLimit = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, InstanceLimit::Unlimited);
    }

    proptest! {
        #[test]
        fn prop_parse_tier_is_total(raw in ".*") {
            let tier = parse_tier(&raw);
            if !matches!(raw.as_str(), "community" | "pro" | "enterprise") {
                prop_assert_eq!(tier, Tier::Community);
            }
        }
    }
}
