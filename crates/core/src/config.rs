use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `ENTITLEMENT__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Syntactic bounds applied to inbound license keys before any lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_min_key_len")]
    pub min_key_len: usize,
    #[serde(default = "default_max_key_len")]
    pub max_key_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Accept `telemetry_ping` events that carry no license key.
    #[serde(default = "default_allow_anonymous_pings")]
    pub allow_anonymous_pings: bool,
    #[serde(default = "default_max_stats_entries")]
    pub max_stats_entries: usize,
    /// Distinct instances tracked before reports from new instances are dropped.
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,
    /// Distinct version strings counted before new ones are dropped.
    #[serde(default = "default_max_versions")]
    pub max_versions: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// JSON file holding an array of license records to preload.
    #[serde(default)]
    pub seed_path: Option<String>,
}

// Default functions
fn default_node_id() -> String {
    "entitlement-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    3002
}
fn default_metrics_enabled() -> bool {
    false
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_min_key_len() -> usize {
    10
}
fn default_max_key_len() -> usize {
    100
}
fn default_allow_anonymous_pings() -> bool {
    true
}
fn default_max_stats_entries() -> usize {
    64
}
fn default_max_instances() -> usize {
    10_000
}
fn default_max_versions() -> usize {
    256
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_key_len: default_min_key_len(),
            max_key_len: default_max_key_len(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            allow_anonymous_pings: default_allow_anonymous_pings(),
            max_stats_entries: default_max_stats_entries(),
            max_instances: default_max_instances(),
            max_versions: default_max_versions(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            validation: ValidationConfig::default(),
            telemetry: TelemetryConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables only.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from an optional TOML file, overridden by environment variables.
    pub fn load_from(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("ENTITLEMENT")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the validator could never satisfy.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.validation.min_key_len > self.validation.max_key_len {
            return Err(config::ConfigError::Message(format!(
                "validation.min_key_len ({}) exceeds validation.max_key_len ({})",
                self.validation.min_key_len, self.validation.max_key_len
            )));
        }
        Ok(())
    }
}
