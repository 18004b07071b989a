//! Windowed aggregation sink for the Stackdriver custom-metrics gateway
//!
//! Turbine emits events far faster than the batch API wants to be called,
//! so this sink folds every sample into per-metric running sums and reports
//! the mean of each series once per window:
//!
//! - `write_event` upserts into a shared table guarded by one lock
//! - an independent flusher task ticks on a fixed interval; each tick
//!   snapshots and clears the table in a single locked step, then POSTs the
//!   batch outside the lock
//! - a failed POST is logged and that window's data is dropped; nothing is
//!   retried or requeued
//!
//! Every upsert lands wholly in exactly one window: the snapshot-and-clear
//! holds the same lock the upserts take.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::Sink;
use crate::TurbineEvent;
use crate::extract::{self, MetricKey};

pub const DEFAULT_ENDPOINT: &str = "https://custom-gateway.stackdriver.com/v1/custom";

const API_KEY_HEADER: &str = "x-stackdriver-apikey";

const PROTO_VERSION: u32 = 1;

/// How long one aggregation window lasts.
const FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Running sums for one metric series within the current window.
/// Exists only with `count >= 1`, so the mean is always defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SeriesEntry {
    sum: i64,
    count: i64,
}

impl SeriesEntry {
    fn mean(&self) -> i64 {
        self.sum.div_euclid(self.count)
    }
}

#[derive(Debug, Serialize)]
struct DataPoint {
    name: String,
    value: i64,
    collected_at: i64,
}

#[derive(Debug, Serialize)]
struct BatchReport {
    timestamp: i64,
    proto_version: u32,
    data: Vec<DataPoint>,
}

struct Shared {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    state: Mutex<HashMap<String, SeriesEntry>>,
}

impl Shared {
    /// Report and reset the current window.
    #[instrument(skip(self))]
    async fn flush(&self) {
        let snapshot = {
            let mut state = self.state.lock().await;
            std::mem::take(&mut *state)
        };

        if snapshot.is_empty() {
            debug!("no metrics to publish this window");
            return;
        }

        let now = Utc::now().timestamp();
        let mut data: Vec<DataPoint> = snapshot
            .into_iter()
            .map(|(name, series)| DataPoint {
                name,
                value: series.mean(),
                collected_at: now,
            })
            .collect();
        data.sort_by(|a, b| a.name.cmp(&b.name));

        let report = BatchReport {
            timestamp: now,
            proto_version: PROTO_VERSION,
            data,
        };

        info!("publishing {} metrics to stackdriver", report.data.len());

        let response = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&report)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                trace!("stackdriver accepted the batch");
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!("stackdriver rejected the batch ({status}): {body}");
            }
            Err(e) => error!("error publishing metrics to stackdriver: {e}"),
        }
    }
}

async fn run_flusher(shared: Arc<Shared>, cancel: CancellationToken, period: Duration) {
    let mut ticker = interval(period);
    // the first tick of a tokio interval completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => shared.flush().await,

            _ = cancel.cancelled() => {
                debug!("publishing one final window before shutdown");
                shared.flush().await;
                break;
            }
        }
    }
}

/// Sink that owns the aggregation table and its flusher task.
pub struct StackdriverSink {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl StackdriverSink {
    pub fn new(api_key: String, endpoint: String) -> Self {
        Self::with_flush_interval(api_key, endpoint, FLUSH_INTERVAL)
    }

    pub fn with_flush_interval(api_key: String, endpoint: String, period: Duration) -> Self {
        debug!("opening stackdriver backend to {endpoint} (window {period:?})");

        let shared = Arc::new(Shared {
            http: reqwest::Client::new(),
            api_key,
            endpoint,
            state: Mutex::new(HashMap::new()),
        });

        let cancel = CancellationToken::new();
        let flusher = tokio::spawn(run_flusher(shared.clone(), cancel.clone(), period));

        Self {
            shared,
            cancel,
            flusher: Mutex::new(Some(flusher)),
        }
    }
}

/// Historical `turbine_` prefix plus the sanitized base key; percentile
/// samples are suffixed `_<percentile>pct`.
fn format_key(key: &MetricKey) -> String {
    let base = extract::sanitize_key(&format!(
        "turbine_{}_{}_{}_{}",
        key.cluster, key.event_name, key.resource_type, key.field
    ));

    match &key.percentile {
        Some(percentile) => format!("{base}_{}pct", percentile.replace('.', "_")),
        None => base,
    }
}

#[async_trait]
impl Sink for StackdriverSink {
    fn name(&self) -> &'static str {
        "stackdriver"
    }

    async fn write_event(&self, event: TurbineEvent) {
        let samples = match extract::extract_samples(&event) {
            Ok(samples) => samples,
            Err(e) => {
                warn!(cluster = %event.cluster, "skipping event: {e}");
                return;
            }
        };

        if samples.is_empty() {
            return;
        }

        let mut state = self.shared.state.lock().await;
        for sample in samples {
            state
                .entry(format_key(&sample.key))
                .and_modify(|series| {
                    series.count += 1;
                    series.sum += sample.value;
                })
                .or_insert(SeriesEntry {
                    sum: sample.value,
                    count: 1,
                });
        }
    }

    async fn shutdown(&self) {
        self.cancel.cancel();

        if let Some(flusher) = self.flusher.lock().await.take() {
            if let Err(e) = flusher.await {
                error!("flusher task failed: {e}");
            }
        }
    }
}
