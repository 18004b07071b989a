//! Actor-based ingestion pipeline
//!
//! Each part of the pipeline runs as an independent async task communicating
//! via Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!   Ingestor (prod)  ──┐
//!   Ingestor (qa)    ──┼──> shared mpsc channel ──> Dispatcher ──> Sink ──> backend
//!   Ingestor (...)   ──┘        (bounded)
//! ```
//!
//! - **StreamIngestorActor**: one per configured cluster; holds a persistent
//!   streaming connection and reconnects forever on failure
//! - **DispatcherActor**: single consumer draining the shared channel into
//!   the configured sink, in arrival order
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each ingestor has an mpsc command channel for control
//!    messages (shutdown)
//! 2. **Events**: decoded events flow through one bounded mpsc channel; a
//!    full channel blocks the producers, which is the pipeline's only
//!    backpressure mechanism
//! 3. **Shutdown**: ingestors drop their senders on exit, so the channel
//!    closes only once every producer has stopped; the dispatcher drains
//!    whatever is left and stops

pub mod dispatcher;
pub mod ingestor;
pub mod messages;
