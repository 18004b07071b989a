//! StreamIngestorActor - tails one cluster's turbine event stream
//!
//! Each configured cluster gets its own ingestor. The actor holds a single
//! streaming HTTP connection open indefinitely, decodes `data: ` frames into
//! events and pushes them onto the shared event channel. Any connection or
//! read failure tears the session down and the actor reconnects after a
//! fixed delay, forever - upstream unavailability must never kill the
//! process.
//!
//! ## Session lifecycle
//!
//! ```text
//! Idle -> Connecting -> Streaming -> (error) -> backoff -> Connecting -> ...
//!                            |
//!                            └── Shutdown command -> stopped
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use futures::TryStreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::io::StreamReader;
use tracing::{debug, error, instrument, trace, warn};

use crate::TurbineEvent;
use crate::config::Config;

use super::messages::IngestorCommand;

/// Prefix of a meaningful stream line; everything else is keep-alive noise.
const DATA_PREFIX: &str = "data: ";

/// How long to wait after a failed session before reconnecting.
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Idle deadline for the initial request/response exchange.
const INITIAL_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Rolling idle deadline between lines once the stream is established.
const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings shared by every ingestor.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub tls_enabled: bool,
    pub reconnect_delay: Duration,
    pub initial_read_timeout: Duration,
    pub stream_read_timeout: Duration,
}

impl StreamConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.host.trim().to_string(),
            port: config.port,
            path: config.path.trim().to_string(),
            tls_enabled: config.tls_enabled,
            reconnect_delay: RECONNECT_DELAY,
            initial_read_timeout: INITIAL_READ_TIMEOUT,
            stream_read_timeout: STREAM_READ_TIMEOUT,
        }
    }

    fn stream_url(&self) -> String {
        let scheme = if self.tls_enabled { "https" } else { "http" };
        format!(
            "{scheme}://{}:{}{}/turbine.stream",
            self.host, self.port, self.path
        )
    }
}

/// One logical subscription to a cluster's event stream.
struct TurbineStream {
    config: StreamConfig,
    cluster: String,

    /// HTTP client (reused across reconnects)
    client: reqwest::Client,

    /// Shared event channel; a full channel blocks the read loop
    event_tx: mpsc::Sender<TurbineEvent>,
}

impl TurbineStream {
    /// Open one session and pump frames until it fails.
    ///
    /// Only ever returns an error: a healthy stream stays open forever.
    async fn stream_events(&self) -> Result<()> {
        debug!("opening turbine connection to {}", self.config.host);

        let request = self
            .client
            .get(self.config.stream_url())
            .query(&[("cluster", self.cluster.as_str())]);

        let response = timeout(self.config.initial_read_timeout, request.send())
            .await
            .context("timed out sending stream request")?
            .context("failed to send stream request")?
            .error_for_status()
            .context("stream request rejected")?;

        let body = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        let mut lines = BufReader::new(body).lines();

        let mut read_deadline = self.config.initial_read_timeout;
        loop {
            let line = timeout(read_deadline, lines.next_line())
                .await
                .context("stream went idle")?
                .context("error reading from stream")?
                .context("stream closed by server")?;
            read_deadline = self.config.stream_read_timeout;

            let Some(payload) = line.trim().strip_prefix(DATA_PREFIX) else {
                trace!("ignoring non-data line");
                continue;
            };

            match TurbineEvent::parse(&self.cluster, payload) {
                Ok(event) => {
                    trace!("decoded event with {} fields", event.fields.len());
                    self.event_tx
                        .send(event)
                        .await
                        .context("event channel closed")?;
                }
                Err(e) => warn!("discarding malformed frame: {e}"),
            }
        }
    }
}

/// Actor that tails a single cluster's event stream
pub struct StreamIngestorActor {
    stream: TurbineStream,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<IngestorCommand>,
}

impl StreamIngestorActor {
    pub fn new(
        config: StreamConfig,
        cluster: String,
        command_rx: mpsc::Receiver<IngestorCommand>,
        event_tx: mpsc::Sender<TurbineEvent>,
    ) -> Self {
        Self {
            stream: TurbineStream {
                config,
                cluster,
                client: reqwest::Client::builder()
                    .build()
                    .expect("failed to build HTTP client"),
                event_tx,
            },
            command_rx,
        }
    }

    /// Run the actor's main loop
    ///
    /// Streams until the session fails, backs off, reconnects. Exits only on
    /// a Shutdown command or when the event channel is gone.
    #[instrument(skip(self), fields(cluster = %self.stream.cluster))]
    pub async fn run(mut self) {
        debug!("starting stream ingestor");

        loop {
            tokio::select! {
                result = self.stream.stream_events() => {
                    if let Err(e) = result {
                        error!("turbine session ended: {e:#}");
                    }

                    if self.stream.event_tx.is_closed() {
                        warn!("event channel closed, shutting down");
                        break;
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(IngestorCommand::Shutdown) => {
                            debug!("received shutdown command");
                        }
                        None => warn!("command channel closed, shutting down"),
                    }
                    break;
                }
            }

            trace!("reconnecting in {:?}", self.stream.config.reconnect_delay);
            tokio::select! {
                _ = sleep(self.stream.config.reconnect_delay) => {}

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(IngestorCommand::Shutdown) => {
                            debug!("received shutdown command");
                        }
                        None => warn!("command channel closed, shutting down"),
                    }
                    break;
                }
            }
        }

        debug!("stream ingestor stopped");
    }
}

/// Handle for controlling a StreamIngestorActor
#[derive(Clone)]
pub struct IngestorHandle {
    sender: mpsc::Sender<IngestorCommand>,

    /// Cluster this ingestor is bound to
    pub cluster: String,
}

impl IngestorHandle {
    /// Spawn a new ingestor actor bound to one cluster
    pub fn spawn(
        config: StreamConfig,
        cluster: String,
        event_tx: mpsc::Sender<TurbineEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = StreamIngestorActor::new(config, cluster.clone(), cmd_rx, event_tx);

        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            cluster,
        }
    }

    /// Gracefully shut down the ingestor
    pub async fn shutdown(&self) {
        let _ = self.sender.send(IngestorCommand::Shutdown).await;
    }
}
