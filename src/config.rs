use tracing::trace;

/// Metrics backend configuration.
///
/// The backend is selected once at startup; every decoded event is routed to
/// exactly one backend for the lifetime of the process. An unrecognized
/// `type` fails deserialization and aborts startup.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Per-event gauges pushed to a StatsD daemon.
    Statsd {
        host: String,

        #[serde(default = "default_statsd_port")]
        port: u16,

        /// Prefix the statsd client prepends to every metric name.
        #[serde(default = "default_statsd_prefix")]
        prefix: String,
    },

    /// Windowed averages POSTed to the Stackdriver custom-metrics gateway.
    Stackdriver {
        api_key: String,

        #[serde(default = "default_stackdriver_endpoint")]
        endpoint: String,
    },
}

fn default_statsd_port() -> u16 {
    8125
}

fn default_statsd_prefix() -> String {
    "turbine".to_string()
}

fn default_stackdriver_endpoint() -> String {
    crate::sinks::stackdriver::DEFAULT_ENDPOINT.to_string()
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Turbine host to connect to.
    pub host: String,

    pub port: u16,

    /// Base path prepended to the stream endpoint.
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub tls_enabled: bool,

    /// Clusters to ingest. One streaming connection is held per entry.
    pub clusters: Vec<String>,

    /// Capacity of the shared event channel. Bounded so that a slow backend
    /// stalls ingestion instead of growing memory without limit.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    pub backend: BackendConfig,
}

fn default_event_buffer() -> usize {
    1024
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("a turbine host must be configured");
        }

        if !self.clusters.iter().any(|c| !c.trim().is_empty()) {
            anyhow::bail!("at least one cluster must be configured");
        }

        if self.event_buffer == 0 {
            anyhow::bail!("event_buffer must be greater than zero");
        }

        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("invalid configuration file: {e}"))?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
