//! REST handlers for entitlement checks, telemetry pings and operational endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use entitlement_core::EntitlementError;
use entitlement_licensing::{
    EntitlementRequest, EntitlementResolver, EntitlementResult, Feature, InstanceLimit,
    RetentionLimits, TelemetrySink, Tier,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<EntitlementResolver>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub node_id: String,
    pub start_time: Instant,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a terminal resolution failure onto its HTTP status.
fn error_response(err: &EntitlementError) -> ApiError {
    let status = match err {
        EntitlementError::Format(_) => StatusCode::BAD_REQUEST,
        EntitlementError::Authorization(_) => StatusCode::UNAUTHORIZED,
        EntitlementError::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let message = match err {
        EntitlementError::Format(msg) | EntitlementError::Authorization(msg) => msg.clone(),
        // Storage details stay in the logs.
        EntitlementError::Infrastructure(_) => {
            "License service temporarily unavailable".to_string()
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.kind().to_string(),
            message,
        }),
    )
}

/// POST /v1/entitlements — license check or telemetry ping.
///
/// Deactivated and expired licenses answer 200 with `valid: false`.
pub async fn handle_entitlement(
    State(state): State<AppState>,
    payload: Result<Json<EntitlementRequest>, JsonRejection>,
) -> Result<Json<EntitlementResult>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        metrics::counter!("entitlements.format_errors").increment(1);
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid_request".to_string(),
                message: rejection.body_text(),
            }),
        )
    })?;

    metrics::counter!(
        "entitlements.requests",
        "event_type" => request.event_type.as_str()
    )
    .increment(1);

    match state.resolver.handle(&request, Utc::now()).await {
        Ok(resolution) => {
            metrics::counter!("entitlements.resolved", "outcome" => resolution.state).increment(1);

            let mut report = request.telemetry_report();
            report.license_id = resolution.license_id;
            state.telemetry.record(report);
            metrics::counter!(
                "telemetry.reports",
                "event_type" => request.event_type.as_str()
            )
            .increment(1);

            Ok(Json(resolution.result))
        }
        Err(e) => {
            match &e {
                EntitlementError::Format(_) => {
                    metrics::counter!("entitlements.format_errors").increment(1)
                }
                EntitlementError::Authorization(_) => {
                    metrics::counter!("entitlements.not_found").increment(1)
                }
                EntitlementError::Infrastructure(_) => {
                    error!(
                        instance_id = %request.instance_id,
                        error = %e,
                        "Entitlement lookup failed"
                    );
                    metrics::counter!("entitlements.lookup_errors").increment(1)
                }
            }
            Err(error_response(&e))
        }
    }
}

/// GET /v1/tiers — the static capability table.
pub async fn list_tiers() -> Json<Vec<TierSummary>> {
    Json(
        Tier::ALL
            .iter()
            .map(|tier| {
                let caps = tier.capabilities();
                TierSummary {
                    tier: *tier,
                    features: caps.features.into_iter().collect(),
                    instance_limit: caps.instance_limit,
                    retention_limits: caps.retention,
                }
            })
            .collect(),
    )
}

/// GET /health — Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe.
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live — Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierSummary {
    pub tier: Tier,
    pub features: Vec<Feature>,
    pub instance_limit: InstanceLimit,
    pub retention_limits: RetentionLimits,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ApiServer;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::Router;
    use chrono::Duration;
    use entitlement_core::AppConfig;
    use entitlement_licensing::{
        Customer, InMemoryLicenseStore, InMemoryTelemetrySink, LicenseRecord,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    const PRO_KEY: &str = "bdb_live_pro_0000000001";
    const EXPIRED_KEY: &str = "bdb_live_exp_0000000002";
    const INACTIVE_KEY: &str = "bdb_live_off_0000000003";

    fn record(key: &str, active: bool, expired: bool, tier: &str) -> LicenseRecord {
        LicenseRecord {
            id: Uuid::new_v4(),
            key: key.to_string(),
            active,
            expires_at: expired.then(|| Utc::now() - Duration::days(1)),
            tier: tier.to_string(),
            customer: Customer {
                id: Uuid::new_v4(),
                name: None,
                email: "ops@acme.test".into(),
            },
        }
    }

    type TestApp = (Router, Arc<InMemoryLicenseStore>, Arc<InMemoryTelemetrySink>);

    fn app_with(config: AppConfig) -> TestApp {
        let store = Arc::new(InMemoryLicenseStore::with_records([
            record(PRO_KEY, true, false, "pro"),
            record(EXPIRED_KEY, true, true, "enterprise"),
            record(INACTIVE_KEY, false, false, "pro"),
        ]));
        let sink = Arc::new(InMemoryTelemetrySink::new(&config.telemetry));
        let resolver = Arc::new(EntitlementResolver::from_config(store.clone(), &config));
        let server = ApiServer::new(config, resolver, sink.clone());
        (server.router(), store, sink)
    }

    fn app() -> TestApp {
        app_with(AppConfig::default())
    }

    fn license_check(key: &str, instance_id: &str) -> Value {
        json!({ "licenseKey": key, "instanceId": instance_id, "eventType": "license_check" })
    }

    async fn post(app: Router, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/entitlements")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_valid_license_check() {
        let (app, _, sink) = app();
        let (status, body) = post(
            app,
            license_check(PRO_KEY, "inst-1"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], json!(true));
        assert_eq!(body["tier"], json!("pro"));
        assert_eq!(body["instanceLimit"], json!(10));
        assert_eq!(body["retentionLimits"]["aclRetentionHours"], json!(2160));
        assert!(body["features"].as_array().unwrap().contains(&json!("keyAnalytics")));
        assert!(body.get("error").is_none());
        assert_eq!(sink.instance("inst-1").unwrap().license_checks, 1);
    }

    #[tokio::test]
    async fn test_expired_and_deactivated_are_200() {
        let (app, _, _) = app();
        let (status, body) = post(
            app.clone(),
            license_check(EXPIRED_KEY, "inst-2"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], json!(false));
        assert_eq!(body["error"], json!("License has expired"));
        assert!(!body["expiresAt"].is_null());

        let (status, body) = post(
            app,
            license_check(INACTIVE_KEY, "inst-2"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tier"], json!("community"));
        assert_eq!(body["error"], json!("License has been deactivated"));
        assert!(body["expiresAt"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_key_is_401() {
        let (app, _, _) = app();
        let (status, body) = post(
            app,
            license_check("bdb_live_nope_000000", "inst-3"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], json!("Invalid license key"));
    }

    #[tokio::test]
    async fn test_format_errors_are_400_without_lookup() {
        let (app, store, _) = app();
        let (status, body) = post(
            app.clone(),
            license_check("short", "inst-4"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], json!("Invalid license key format"));

        let (status, body) = post(
            app,
            json!({ "instanceId": "inst-4", "eventType": "license_check" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], json!("licenseKey is required"));
        assert_eq!(store.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let (app, _, _) = app();
        let (status, body) = post(app, json!({ "instanceId": "inst-5" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("invalid_request"));
    }

    #[tokio::test]
    async fn test_store_outage_is_503() {
        let (app, store, _) = app();
        store.set_available(false);
        let (status, body) = post(
            app,
            license_check(PRO_KEY, "inst-6"),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], json!("lookup_unavailable"));
        assert_eq!(body["message"], json!("License service temporarily unavailable"));
    }

    #[test]
    fn test_error_response_covers_every_kind() {
        let cases = [
            (EntitlementError::Format("bad".into()), StatusCode::BAD_REQUEST, "bad"),
            (EntitlementError::Authorization("no".into()), StatusCode::UNAUTHORIZED, "no"),
            (
                EntitlementError::Infrastructure("pool exhausted".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "License service temporarily unavailable",
            ),
        ];
        for (err, status, message) in cases {
            let (got, Json(body)) = error_response(&err);
            assert_eq!(got, status);
            assert_eq!(body.error, err.kind());
            assert_eq!(body.message, message);
        }
    }

    #[tokio::test]
    async fn test_anonymous_ping_forwards_telemetry() {
        let (app, store, sink) = app();
        let (status, body) = post(
            app,
            json!({
                "instanceId": "inst-7",
                "eventType": "telemetry_ping",
                "version": "0.4.1",
                "platform": "linux",
                "stats": { "keys": 1200 }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], json!(false));
        assert!(body.get("error").is_none());
        assert_eq!(store.lookup_count(), 0);

        let summary = sink.instance("inst-7").unwrap();
        assert_eq!(summary.telemetry_pings, 1);
        assert_eq!(summary.platform.as_deref(), Some("linux"));
        assert_eq!(sink.version_counts().get("0.4.1"), Some(&1));
    }

    #[tokio::test]
    async fn test_anonymous_ping_rejected_when_disabled() {
        let mut config = AppConfig::default();
        config.telemetry.allow_anonymous_pings = false;
        let (app, _, _) = app_with(config);
        let (status, _) = post(
            app,
            json!({ "instanceId": "inst-8", "eventType": "telemetry_ping" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_tiers_endpoint() {
        let (app, _, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/v1/tiers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let tiers: Vec<TierSummary> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(tiers.len(), 3);
        assert!(tiers[0].features.is_empty());
        assert_eq!(tiers[2].instance_limit, InstanceLimit::Unlimited);
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
