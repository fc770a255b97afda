//! Entitlement server — resolves license keys into tier entitlements over HTTP.
//!
//! Main entry point that loads configuration, seeds the license store and starts the server.

use anyhow::Context;
use clap::Parser;
use entitlement_api::ApiServer;
use entitlement_core::config::AppConfig;
use entitlement_licensing::tier::verify_monotonic;
use entitlement_licensing::{EntitlementResolver, InMemoryLicenseStore, InMemoryTelemetrySink};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_LOG_FILTER: &str = concat!(
    "entitlement_server=info,entitlement_api=info,",
    "entitlement_licensing=info,tower_http=info"
);

#[derive(Parser, Debug)]
#[command(name = "entitlement-server")]
#[command(about = "License entitlement resolution service")]
#[command(version)]
struct Cli {
    /// Optional TOML config file (environment variables still take precedence)
    #[arg(long, short = 'c', env = "ENTITLEMENT_CONFIG")]
    config: Option<String>,

    /// Bind host (overrides config)
    #[arg(long, env = "ENTITLEMENT__API__HOST")]
    host: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "ENTITLEMENT__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// JSON file of license records to preload (overrides config)
    #[arg(long, env = "ENTITLEMENT__STORE__SEED_PATH")]
    seed: Option<String>,

    /// Reject telemetry pings that carry no license key
    #[arg(long, default_value_t = false)]
    deny_anonymous_pings: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Entitlement server starting up");

    let mut config = AppConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;

    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(seed) = cli.seed {
        config.store.seed_path = Some(seed);
    }
    if cli.deny_anonymous_pings {
        config.telemetry.allow_anonymous_pings = false;
    }
    config
        .validate()
        .context("invalid configuration after CLI overrides")?;

    if let Err(violation) = verify_monotonic() {
        error!(%violation, "Tier capability table is not monotonic");
        anyhow::bail!("invalid tier table: {violation}");
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        min_key_len = config.validation.min_key_len,
        max_key_len = config.validation.max_key_len,
        allow_anonymous_pings = config.telemetry.allow_anonymous_pings,
        "Configuration loaded"
    );

    let store = match &config.store.seed_path {
        Some(path) => Arc::new(InMemoryLicenseStore::from_seed_file(Path::new(path))?),
        None => {
            warn!("No license seed configured; every keyed request will be rejected");
            Arc::new(InMemoryLicenseStore::new())
        }
    };

    let resolver = Arc::new(EntitlementResolver::from_config(store, &config));
    let telemetry = Arc::new(InMemoryTelemetrySink::new(&config.telemetry));

    let api_server = ApiServer::new(config, resolver, telemetry);

    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Entitlement server is ready to serve traffic");

    api_server.start_http().await?;

    Ok(())
}
