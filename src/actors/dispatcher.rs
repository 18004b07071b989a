//! DispatcherActor - fans concurrently-produced events into the sink
//!
//! Single consumer of the shared event channel. Events are forwarded to the
//! sink in arrival order (interleaved across clusters, ordered within one).
//! A slow sink call blocks further draining, which backpressures every
//! ingestor through the bounded channel.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace};

use crate::TurbineEvent;
use crate::sinks::Sink;

pub struct DispatcherActor {
    /// Event receiver (sole consumer of the shared channel)
    event_rx: mpsc::Receiver<TurbineEvent>,

    /// The one sink every event is forwarded to
    sink: Arc<dyn Sink>,

    dispatched: u64,
}

impl DispatcherActor {
    pub fn new(event_rx: mpsc::Receiver<TurbineEvent>, sink: Arc<dyn Sink>) -> Self {
        Self {
            event_rx,
            sink,
            dispatched: 0,
        }
    }

    /// Run until the event channel closes, i.e. until every ingestor has
    /// dropped its sender.
    #[instrument(skip(self), fields(sink = self.sink.name()))]
    pub async fn run(mut self) {
        debug!("starting dispatcher");

        while let Some(event) = self.event_rx.recv().await {
            trace!(cluster = %event.cluster, "dispatching event");
            self.sink.write_event(event).await;
            self.dispatched += 1;
        }

        debug!(
            "event channel closed, dispatcher stopped after {} events",
            self.dispatched
        );
    }
}

/// Handle for the DispatcherActor
pub struct DispatcherHandle {
    join: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Spawn the dispatcher as a tokio task
    pub fn spawn(event_rx: mpsc::Receiver<TurbineEvent>, sink: Arc<dyn Sink>) -> Self {
        let actor = DispatcherActor::new(event_rx, sink);

        Self {
            join: tokio::spawn(actor.run()),
        }
    }

    /// Wait for the dispatcher to drain the channel and stop
    pub async fn join(self) -> anyhow::Result<()> {
        self.join.await.context("dispatcher task failed")
    }
}
