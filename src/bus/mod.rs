//! Async message bus decoupling external channels from the agent core.
//!
//! Channels publish to the inbound queue; the main loop consumes it and
//! publishes replies (and adjustment requests) to the outbound queue.
//! Both queues are `tokio::sync::broadcast` channels so tests and multiple
//! channel adapters can observe the same traffic.

pub mod events;

pub use events::{InboundMessage, OutboundMessage};

use tokio::sync::broadcast;
use tracing::warn;

use crate::error::BusError;

const QUEUE_CAPACITY: usize = 100;

/// In-process inbound/outbound message queues.
#[derive(Clone)]
pub struct MessageBus {
    inbound: broadcast::Sender<InboundMessage>,
    outbound: broadcast::Sender<OutboundMessage>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (inbound, _) = broadcast::channel(QUEUE_CAPACITY);
        let (outbound, _) = broadcast::channel(QUEUE_CAPACITY);
        Self { inbound, outbound }
    }

    /// Publish a message from a channel to the agent.
    pub fn publish_inbound(&self, msg: InboundMessage) -> Result<(), BusError> {
        self.inbound.send(msg).map(|_| ()).map_err(|e| {
            warn!("Failed to publish inbound message: {e}");
            BusError::SendFailed(e.to_string())
        })
    }

    pub fn subscribe_inbound(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound.subscribe()
    }

    /// Publish a reply (or adjustment request) toward external channels.
    pub fn publish_outbound(&self, msg: OutboundMessage) -> Result<(), BusError> {
        self.outbound.send(msg).map(|_| ()).map_err(|e| {
            warn!("Failed to publish outbound message: {e}");
            BusError::SendFailed(e.to_string())
        })
    }

    pub fn subscribe_outbound(&self) -> broadcast::Receiver<OutboundMessage> {
        self.outbound.subscribe()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
