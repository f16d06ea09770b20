//! Telemetry sinks receive the flattened schedule on every publish cycle.

use crate::error::PublishError;
use tracing::info;

/// Receives `topic -> payload` pairs, e.g. an MQTT client publishing
/// retained messages.
pub trait TelemetrySink: Send + Sync {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError>;
}

/// Writes every pair to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        info!(topic, payload, "publish");
        Ok(())
    }
}

