//! In-memory transport for exercising exchanges without a network
//!
//! [`MockConnector`] hands out links whose far ends surface through
//! [`MockServer::accept`] as [`MockRemote`]s. Dropping or closing a remote closes the
//! console's link, which is how tests drive the reconnect path.

use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

use crate::transport::{Connector, Link, WireMessage};
use crate::{ChannelError, Result};

/// How long helpers wait before declaring a test hung
pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Counters {
    attempts: AtomicUsize,
    refusals_left: AtomicUsize,
    live_links: AtomicUsize,
    peak_links: AtomicUsize,
}

/// Connector side, given to the exchange under test
#[derive(Clone)]
pub struct MockConnector {
    counters: Arc<Counters>,
    accepted: mpsc::UnboundedSender<MockRemote>,
}

/// Test side, observes connection attempts
pub struct MockServer {
    counters: Arc<Counters>,
    accepted: Mutex<mpsc::UnboundedReceiver<MockRemote>>,
}

impl MockConnector {
    pub fn new() -> (Self, MockServer) {
        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self { counters: Arc::clone(&counters), accepted: tx },
            MockServer { counters, accepted: Mutex::new(rx) },
        )
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Link>> {
        self.counters.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .counters
            .refusals_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ChannelError::transport(format!("connection to {} refused", endpoint)));
        }

        let (to_console, from_remote) = mpsc::unbounded_channel();
        let (to_remote, from_console) = mpsc::unbounded_channel();

        let live = self.counters.live_links.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_links.fetch_max(live, Ordering::SeqCst);

        let remote = MockRemote { inbound: Some(to_console), sent: from_console };
        self.accepted
            .send(remote)
            .map_err(|_| ChannelError::transport("mock server dropped"))?;

        Ok(Box::new(MockLink {
            inbound: from_remote,
            outbound: Some(to_remote),
            counters: Arc::clone(&self.counters),
        }))
    }
}

impl MockServer {
    /// Wait for the next successful connection
    pub async fn accept(&self) -> MockRemote {
        let mut accepted = self.accepted.lock().await;
        tokio::time::timeout(TEST_TIMEOUT, accepted.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// Refuse the next `n` connection attempts
    pub fn refuse_next(&self, n: usize) {
        self.counters.refusals_left.store(n, Ordering::SeqCst);
    }

    /// Total connection attempts, refused ones included
    pub fn attempts(&self) -> usize {
        self.counters.attempts.load(Ordering::SeqCst)
    }

    /// Links currently held by the console
    pub fn live_links(&self) -> usize {
        self.counters.live_links.load(Ordering::SeqCst)
    }

    /// Highest number of links ever held at once
    pub fn peak_links(&self) -> usize {
        self.counters.peak_links.load(Ordering::SeqCst)
    }
}

/// Far end of one link
pub struct MockRemote {
    inbound: Option<mpsc::UnboundedSender<WireMessage>>,
    sent: mpsc::UnboundedReceiver<WireMessage>,
}

impl MockRemote {
    /// Next message the console sent, `None` once the console closed the link
    pub async fn recv(&mut self) -> Option<WireMessage> {
        tokio::time::timeout(TEST_TIMEOUT, self.sent.recv())
            .await
            .expect("timed out waiting for a message from the console")
    }

    /// Next message as parsed JSON text
    pub async fn recv_json(&mut self) -> serde_json::Value {
        match self.recv().await {
            Some(WireMessage::Text(text)) => {
                serde_json::from_str(&text).expect("console sent invalid JSON")
            }
            other => panic!("expected a text message, got {:?}", other),
        }
    }

    /// Assert nothing arrives within `wait`
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Ok(message) = tokio::time::timeout(wait, self.sent.recv()).await {
            panic!("expected silence, got {:?}", message);
        }
    }

    pub fn send_binary(&self, data: impl Into<Bytes>) {
        self.send(WireMessage::Binary(data.into()));
    }

    pub fn send_text(&self, text: impl Into<String>) {
        self.send(WireMessage::Text(text.into()));
    }

    fn send(&self, message: WireMessage) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(message);
        }
    }

    /// Close the link from the robot side
    pub fn close(&mut self) {
        self.inbound = None;
    }
}

struct MockLink {
    inbound: mpsc::UnboundedReceiver<WireMessage>,
    outbound: Option<mpsc::UnboundedSender<WireMessage>>,
    counters: Arc<Counters>,
}

#[async_trait::async_trait]
impl Link for MockLink {
    async fn send(&mut self, message: WireMessage) -> Result<()> {
        let outbound = self.outbound.as_ref().ok_or_else(|| ChannelError::transport("link closed"))?;
        outbound.send(message).map_err(|_| ChannelError::transport("remote hung up"))
    }

    async fn recv(&mut self) -> Option<Result<WireMessage>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.outbound = None;
        Ok(())
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.counters.live_links.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Connector whose links accept `accepted_sends` messages and then never complete
/// another send. Receives never yield.
#[derive(Clone)]
pub struct StallingConnector {
    accepted_sends: usize,
    stalled: Arc<AtomicUsize>,
}

impl StallingConnector {
    pub fn new(accepted_sends: usize) -> Self {
        Self { accepted_sends, stalled: Arc::new(AtomicUsize::new(0)) }
    }

    /// Sends currently blocked on a stalled link
    pub fn stalled_sends(&self) -> usize {
        self.stalled.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for StallingConnector {
    async fn connect(&self, _endpoint: &str) -> Result<Box<dyn Link>> {
        Ok(Box::new(StallingLink {
            remaining: self.accepted_sends,
            stalled: Arc::clone(&self.stalled),
        }))
    }
}

struct StallingLink {
    remaining: usize,
    stalled: Arc<AtomicUsize>,
}

/// Decrements the stalled counter when a blocked send is dropped
struct StallGuard(Arc<AtomicUsize>);

impl Drop for StallGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Link for StallingLink {
    async fn send(&mut self, _message: WireMessage) -> Result<()> {
        if self.remaining > 0 {
            self.remaining -= 1;
            return Ok(());
        }
        self.stalled.fetch_add(1, Ordering::SeqCst);
        let _guard = StallGuard(Arc::clone(&self.stalled));
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<WireMessage>> {
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
