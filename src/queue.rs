//! Ordered outbound command buffer
//!
//! Commands drain strictly first-in first-out, and only while the link is open. A
//! command is popped before it is handed to the transport: if that send fails the
//! command is gone (at-most-once per attempt) while everything behind it stays
//! queued, untouched, for the next link.

use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::Result;
use crate::exchange::OpenLink;
use crate::transport::WireMessage;
use crate::types::OutboundEnvelope;

/// Unbounded FIFO of command envelopes
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<OutboundEnvelope>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command. Never blocks, never rejects.
    pub fn enqueue(&mut self, envelope: OutboundEnvelope) {
        self.pending.push_back(envelope);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Next command to be sent
    pub fn head(&self) -> Option<&OutboundEnvelope> {
        self.pending.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutboundEnvelope> {
        self.pending.iter()
    }

    /// Send queued commands in order until the queue is empty or the link stops
    /// being open. Returns how many were handed to the transport.
    pub async fn drain(&mut self, link: &mut OpenLink<'_>) -> Result<usize> {
        let mut sent = 0;
        while link.is_open() {
            let Some(envelope) = self.pending.pop_front() else {
                break;
            };
            let text = match envelope.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(exchange = %link.exchange(), "Dropping unencodable command {:?}: {}", envelope.message, e);
                    continue;
                }
            };
            debug!(exchange = %link.exchange(), "Sending {:?}", envelope);
            link.send(WireMessage::Text(text)).await?;
            sent += 1;
        }
        Ok(sent)
    }
}
