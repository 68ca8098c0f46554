//! Push-role command exchange
//!
//! The [`CommandQueue`] lives inside the exchange task. Callers hand envelopes over
//! an unbounded channel, so enqueueing never waits on the link, and the task drains
//! whenever the link opens or a new command arrives while it is open.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ConsoleSettings;
use crate::exchange::{ExchangeConnection, ExchangeHandler, LinkState, OpenLink};
use crate::queue::CommandQueue;
use crate::transport::Connector;
use crate::types::{Credentials, OperatorCommand, OutboundEnvelope, Role};
use crate::{ChannelError, Result};

struct CommandHandler {
    queue: CommandQueue,
    inbound: mpsc::UnboundedReceiver<OutboundEnvelope>,
}

impl CommandHandler {
    /// Move everything handed over so far into the queue
    fn absorb(&mut self) {
        while let Ok(envelope) = self.inbound.try_recv() {
            self.queue.enqueue(envelope);
        }
    }
}

#[async_trait::async_trait]
impl ExchangeHandler for CommandHandler {
    async fn opened(&mut self, link: &mut OpenLink<'_>) -> Result<()> {
        self.absorb();
        if !self.queue.is_empty() {
            debug!(exchange = %link.exchange(), "Sending {} queued commands", self.queue.len());
        }
        self.queue.drain(link).await.map(|_| ())
    }

    fn message(&mut self, data: Bytes) {
        match serde_json::from_slice::<serde_json::Value>(&data) {
            Ok(ack) => info!("Robot replied: {}", ack),
            Err(e) => warn!("Unreadable reply on command exchange: {}", e),
        }
    }

    fn closed(&mut self) {
        if !self.queue.is_empty() {
            info!("{} commands waiting for the next link", self.queue.len());
        }
    }

    async fn outbound_ready(&mut self) {
        match self.inbound.recv().await {
            Some(envelope) => self.queue.enqueue(envelope),
            // All senders gone; only shutdown ends the session from here
            None => std::future::pending::<()>().await,
        }
    }

    async fn flush(&mut self, link: &mut OpenLink<'_>) -> Result<()> {
        self.absorb();
        self.queue.drain(link).await.map(|_| ())
    }
}

/// Sends operator commands to the robot
pub struct NetworkOperator {
    credentials: Credentials,
    outbound: mpsc::UnboundedSender<OutboundEnvelope>,
    connection: ExchangeConnection,
}

impl NetworkOperator {
    /// Open the command exchange.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(connector: Arc<dyn Connector>, settings: &ConsoleSettings) -> Self {
        let (outbound, inbound) = mpsc::unbounded_channel();
        let handler = CommandHandler { queue: CommandQueue::new(), inbound };
        let connection = ExchangeConnection::open(
            connector,
            settings.exchange_config(&settings.exchanges.commands, Role::Push),
            handler,
        );
        info!(robot = %settings.robot_name, "Network operator started");
        Self { credentials: settings.credentials(), outbound, connection }
    }

    /// Queue a command for delivery.
    ///
    /// Succeeds whatever the link state; the command is sent once the link is open.
    /// Fails only after shutdown.
    pub fn enqueue(&self, command: OperatorCommand) -> Result<()> {
        let exchange = self.connection.exchange();
        if self.connection.state() == LinkState::Shutdown {
            return Err(ChannelError::Shutdown { exchange: exchange.to_string() });
        }
        debug!(exchange = %exchange, "Queueing {:?}", command);
        let envelope = OutboundEnvelope::new(exchange, &self.credentials, command);
        self.outbound
            .send(envelope)
            .map_err(|_| ChannelError::Shutdown { exchange: exchange.to_string() })
    }

    pub fn state(&self) -> LinkState {
        self.connection.state()
    }

    pub async fn wait_until_open(&self) {
        self.connection.wait_for(LinkState::Open).await;
    }

    pub fn shutdown(&self) {
        self.connection.shutdown();
    }

    pub async fn close(self) {
        self.connection.close().await;
    }
}
