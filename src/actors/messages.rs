//! Message types for actor communication
//!
//! Decoded events themselves ([`crate::TurbineEvent`]) travel over the shared
//! event channel; the types here are the control messages sent to individual
//! actors via their command channels.

/// Commands that can be sent to a StreamIngestorActor
#[derive(Debug)]
pub enum IngestorCommand {
    /// Gracefully shut down the ingestor
    ///
    /// The actor drops the streaming connection (or interrupts its reconnect
    /// backoff) and exits, dropping its event sender.
    Shutdown,
}
