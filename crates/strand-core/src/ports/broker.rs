//! Broker port: the message transport seam.
//!
//! The engine does not depend on a specific broker API surface, only on
//! "publish bytes with a partition key" and "deliver bytes". At-least-once
//! delivery is assumed; idempotence of task bodies for a given task id is
//! the handler author's responsibility, not the coordinator's.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::TaskEnvelope;
use crate::error::StrandError;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish raw bytes. `partition_key` is the broker-side ordering key:
    /// delivery order within one partition must match publish order, which
    /// is what makes the coordinator's FIFO guarantee meaningful end to end.
    async fn publish(&self, partition_key: Option<&str>, raw: Vec<u8>) -> Result<(), StrandError>;

    /// Next delivered message, or None once the broker is closed/shut down.
    async fn next(&self) -> Option<Vec<u8>>;
}

/// Producer-side surface: hands envelopes to the broker, keyed by strand.
pub struct Producer {
    broker: Arc<dyn Broker>,
}

impl Producer {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    pub async fn submit(&self, envelope: &TaskEnvelope) -> Result<(), StrandError> {
        let raw = envelope.to_bytes()?;
        self.broker
            .publish(envelope.key().map(|k| k.as_str()), raw)
            .await
    }
}
