//! Metric sinks
//!
//! A sink consumes decoded turbine events and exposes the extracted metrics
//! to one backend. Two shapes exist:
//!
//! - **StatsdSink**: stateless, one gauge call per metric per event
//! - **StackdriverSink**: stateful, accumulates per-metric averages and
//!   flushes them in one batched report per window
//!
//! The sink is chosen once at startup from the configuration and shared by
//! the dispatcher for the lifetime of the process.

pub mod stackdriver;
pub mod statsd;

use std::sync::Arc;

use async_trait::async_trait;

use crate::TurbineEvent;
use crate::config::{BackendConfig, Config};

/// Capability consumed by the dispatcher.
///
/// Implementations must handle their own backend failures: the dispatcher
/// never retries and must never be taken down by a sink.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Name of the backing backend, for logging.
    fn name(&self) -> &'static str;

    /// Consume one event.
    async fn write_event(&self, event: TurbineEvent);

    /// Flush buffered data and stop background work.
    async fn shutdown(&self) {}
}

/// Build the sink selected by the configuration.
pub fn build_sink(config: &Config) -> anyhow::Result<Arc<dyn Sink>> {
    let sink: Arc<dyn Sink> = match &config.backend {
        BackendConfig::Statsd { host, port, prefix } => {
            Arc::new(statsd::StatsdSink::new(host, *port, prefix)?)
        }
        BackendConfig::Stackdriver { api_key, endpoint } => Arc::new(
            stackdriver::StackdriverSink::new(api_key.clone(), endpoint.clone()),
        ),
    };

    Ok(sink)
}
