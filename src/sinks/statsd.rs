//! Immediate per-event gauge sink backed by a StatsD daemon
//!
//! Stateless: every qualifying field of an event becomes one gauge call,
//! issued synchronously while the event is being written. A failed call
//! loses that one gauge and nothing else.

use std::net::UdpSocket;

use anyhow::Context;
use async_trait::async_trait;
use cadence::{Gauged, StatsdClient, UdpMetricSink};
use tracing::{debug, warn};

use super::Sink;
use crate::TurbineEvent;
use crate::extract::{self, MetricKey};

pub struct StatsdSink {
    client: StatsdClient,
}

impl StatsdSink {
    pub fn new(host: &str, port: u16, prefix: &str) -> anyhow::Result<Self> {
        debug!("opening statsd backend to {host}:{port} with prefix {prefix:?}");

        let socket = UdpSocket::bind("0.0.0.0:0").context("failed to bind statsd socket")?;
        let sink =
            UdpMetricSink::from((host, port), socket).context("failed to reach statsd host")?;

        Ok(Self {
            client: StatsdClient::from_sink(prefix, sink),
        })
    }
}

/// `<cluster>_<eventName>_<resourceType>_<field>`, sanitized, with
/// percentile samples suffixed `.<percentile>_pct`. The configured prefix is
/// prepended by the statsd client itself.
fn format_key(key: &MetricKey) -> String {
    let base = extract::sanitize_key(&format!(
        "{}_{}_{}_{}",
        key.cluster, key.event_name, key.resource_type, key.field
    ));

    match &key.percentile {
        Some(percentile) => format!("{base}.{}_pct", percentile.replace('.', "_")),
        None => base,
    }
}

#[async_trait]
impl Sink for StatsdSink {
    fn name(&self) -> &'static str {
        "statsd"
    }

    async fn write_event(&self, event: TurbineEvent) {
        let samples = match extract::extract_samples(&event) {
            Ok(samples) => samples,
            Err(e) => {
                warn!(cluster = %event.cluster, "skipping event: {e}");
                return;
            }
        };

        for sample in samples {
            let key = format_key(&sample.key);
            if let Err(e) = self.client.gauge(&key, sample.value as f64) {
                warn!("failed to submit gauge {key}: {e}");
            }
        }
    }
}
