//! Exchange connections with unconditional reconnect
//!
//! An [`ExchangeConnection`] owns exactly one link at a time for one logical
//! exchange. A single spawned task drives the whole lifecycle:
//!
//! ```text
//! Connecting ──► Open ──► Closed ──► Connecting ──► …
//!      │           │         │
//!      └───────────┴─────────┴──► Shutdown (terminal, explicit only)
//! ```
//!
//! Every successful open sends one handshake before anything else. A close or
//! error on the link, or a refused connect, is followed immediately by a fresh
//! attempt with the same exchange, role and credentials. Events are delivered to
//! an [`ExchangeHandler`], so the task is the only place link state changes.

use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::transport::{Connector, Link, WireMessage};
use crate::types::{Credentials, Handshake, Role};
use crate::{ChannelError, Result};


/// Upper bound on a graceful close before the link is dropped
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Observable connection state of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// Waiting for the transport to open
    Connecting,
    /// Handshake sent, traffic flowing
    Open,
    /// Link gone, a new attempt follows
    Closed,
    /// Explicitly shut down, no further attempts
    Shutdown,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkState::Connecting => "connecting",
            LinkState::Open => "open",
            LinkState::Closed => "closed",
            LinkState::Shutdown => "shutdown",
        })
    }
}

/// Callback for transport errors the caller wants to hear about
pub type ErrorHook = Arc<dyn Fn(&ChannelError) + Send + Sync>;

/// Static description of one exchange
#[derive(Clone)]
pub struct ExchangeConfig {
    /// Gateway URL, shared by all exchanges
    pub endpoint: String,
    /// Exchange name announced in the handshake
    pub exchange: String,
    pub role: Role,
    pub credentials: Credentials,
    /// Pause between a lost link and the next attempt (zero = immediate)
    pub reconnect_delay: Duration,
    /// Receives transport errors in addition to the log
    pub error_hook: Option<ErrorHook>,
}

impl ExchangeConfig {
    pub fn new(
        endpoint: impl Into<String>,
        exchange: impl Into<String>,
        role: Role,
        credentials: Credentials,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            exchange: exchange.into(),
            role,
            credentials,
            reconnect_delay: Duration::ZERO,
            error_hook: None,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.error_hook = Some(hook);
        self
    }
}

impl fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("endpoint", &self.endpoint)
            .field("exchange", &self.exchange)
            .field("role", &self.role)
            .field("credentials", &self.credentials)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("error_hook", &self.error_hook.is_some())
            .finish()
    }
}

/// The open link as seen by a handler.
///
/// A failed send marks the link closed, so a draining handler can check
/// [`is_open`](Self::is_open) before each message. Shutdown interrupts a pending
/// send with [`ChannelError::Shutdown`].
pub struct OpenLink<'a> {
    link: &'a mut dyn Link,
    state: &'a watch::Sender<LinkState>,
    exchange: &'a str,
    cancel: &'a CancellationToken,
}

impl<'a> OpenLink<'a> {
    pub(crate) fn new(
        link: &'a mut dyn Link,
        state: &'a watch::Sender<LinkState>,
        exchange: &'a str,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self { link, state, exchange, cancel }
    }

    pub fn is_open(&self) -> bool {
        *self.state.borrow() == LinkState::Open
    }

    pub fn exchange(&self) -> &str {
        self.exchange
    }

    pub async fn send(&mut self, message: WireMessage) -> Result<()> {
        if !self.is_open() {
            return Err(ChannelError::TransportClosed { exchange: self.exchange.to_string() });
        }
        let sent = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(ChannelError::Shutdown { exchange: self.exchange.to_string() });
            }
            sent = self.link.send(message) => sent,
        };
        match sent {
            Ok(()) => Ok(()),
            Err(e) => {
                set_state(self.state, LinkState::Closed);
                Err(e.for_exchange(self.exchange))
            }
        }
    }

    async fn recv(&mut self) -> Option<Result<WireMessage>> {
        self.link.recv().await
    }
}

/// Typed event notifications from an exchange task.
///
/// Handlers run on the exchange task, one event at a time.
#[async_trait::async_trait]
pub trait ExchangeHandler: Send + 'static {
    /// Link opened and the handshake has been sent
    async fn opened(&mut self, _link: &mut OpenLink<'_>) -> Result<()> {
        Ok(())
    }

    /// Binary message received
    fn message(&mut self, data: Bytes);

    /// Link lost; a reconnect follows unless shut down
    fn closed(&mut self) {}

    /// Any error observed on this exchange, after it has been logged
    fn error(&mut self, _error: &ChannelError) {}

    /// Resolves when the handler has outbound work for [`flush`](Self::flush).
    ///
    /// Polled inside `select!`, so it must be cancel-safe. Never resolves by default.
    async fn outbound_ready(&mut self) {
        std::future::pending::<()>().await
    }

    /// Send outbound work on the open link
    async fn flush(&mut self, _link: &mut OpenLink<'_>) -> Result<()> {
        Ok(())
    }
}

/// Handle to a running exchange
///
/// Dropping the handle shuts the exchange down.
pub struct ExchangeConnection {
    exchange: String,
    state: Arc<watch::Sender<LinkState>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ExchangeConnection {
    /// Start the exchange; the first connection attempt begins immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open<H>(connector: Arc<dyn Connector>, config: ExchangeConfig, handler: H) -> Self
    where
        H: ExchangeHandler,
    {
        let (state, _) = watch::channel(LinkState::Connecting);
        let state = Arc::new(state);
        let cancel = CancellationToken::new();
        let exchange = config.exchange.clone();

        let task = tokio::spawn(run(connector, config, handler, Arc::clone(&state), cancel.clone()));

        Self { exchange, state, cancel, task: Some(task) }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Current state followed by every transition
    pub fn state_updates(&self) -> impl Stream<Item = LinkState> + Send + 'static {
        WatchStream::new(self.state.subscribe())
    }

    /// Wait until the exchange reaches `target` (or shuts down)
    pub async fn wait_for(&self, target: LinkState) -> LinkState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|s| *s == target || *s == LinkState::Shutdown).await {
            Ok(state) => *state,
            Err(_) => LinkState::Shutdown,
        }
    }

    /// Stop reconnecting, then close the current link.
    ///
    /// Payload decodes already spawned still complete.
    pub fn shutdown(&self) {
        if self.state() != LinkState::Shutdown {
            info!(exchange = %self.exchange, "Shutting down exchange");
        }
        self.state.send_replace(LinkState::Shutdown);
        self.cancel.cancel();
    }

    /// Shut down and wait for the exchange task to finish
    pub async fn close(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(exchange = %self.exchange, "Exchange task ended abnormally: {}", e);
            }
        }
    }
}

impl fmt::Debug for ExchangeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeConnection")
            .field("exchange", &self.exchange)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for ExchangeConnection {
    fn drop(&mut self) {
        debug!(exchange = %self.exchange, "Dropping exchange connection");
        self.state.send_replace(LinkState::Shutdown);
        self.cancel.cancel();
    }
}

/// Move to `next` unless already shut down.
fn set_state(state: &watch::Sender<LinkState>, next: LinkState) -> bool {
    state.send_if_modified(|current| {
        if *current == LinkState::Shutdown || *current == next {
            return false;
        }
        *current = next;
        true
    })
}

fn report<H: ExchangeHandler>(config: &ExchangeConfig, handler: &mut H, error: &ChannelError) {
    handler.error(error);
    if let (ChannelError::Transport { .. }, Some(hook)) = (error, &config.error_hook) {
        hook(error);
    }
}

/// Exchange task: connect, run a session, repeat until cancelled.
async fn run<H>(
    connector: Arc<dyn Connector>,
    config: ExchangeConfig,
    mut handler: H,
    state: Arc<watch::Sender<LinkState>>,
    cancel: CancellationToken,
) where
    H: ExchangeHandler,
{
    let name = config.exchange.clone();
    info!(exchange = %name, role = %config.role, "Exchange task started");
    let mut attempts = 0u64;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        set_state(&state, LinkState::Connecting);
        attempts += 1;
        trace!(exchange = %name, "Connection attempt {}", attempts);

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connector.connect(&config.endpoint) => result,
        };

        match connected {
            Ok(mut link) => {
                session(link.as_mut(), &config, &mut handler, &state, &cancel).await;
                match tokio::time::timeout(CLOSE_TIMEOUT, link.close()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(exchange = %name, "Close failed: {}", e),
                    Err(_) => debug!(exchange = %name, "Close timed out, dropping link"),
                }
                if cancel.is_cancelled() {
                    break;
                }
            }
            Err(e) => {
                let e = e.for_exchange(&name);
                warn!(exchange = %name, "Connect failed: {}", e);
                report(&config, &mut handler, &e);
            }
        }

        if cancel.is_cancelled() {
            break;
        }
        set_state(&state, LinkState::Closed);
        handler.closed();

        if config.reconnect_delay.is_zero() {
            // Immediate retry, but let other tasks run between attempts
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(config.reconnect_delay) => {}
            }
        }
        debug!(exchange = %name, "Reconnecting");
    }

    state.send_replace(LinkState::Shutdown);
    info!(exchange = %name, "Exchange task ended after {} connection attempts", attempts);
}

/// One link's lifetime: handshake, then events until the link ends or shutdown.
async fn session<H>(
    link: &mut dyn Link,
    config: &ExchangeConfig,
    handler: &mut H,
    state: &watch::Sender<LinkState>,
    cancel: &CancellationToken,
) where
    H: ExchangeHandler,
{
    let name = config.exchange.as_str();

    let handshake = match Handshake::new(config.role, name, &config.credentials).to_json() {
        Ok(text) => text,
        Err(e) => {
            error!(exchange = %name, "Cannot encode handshake: {}", e);
            report(config, handler, &e);
            return;
        }
    };
    let sent = tokio::select! {
        _ = cancel.cancelled() => return,
        sent = link.send(WireMessage::Text(handshake)) => sent,
    };
    if let Err(e) = sent {
        let e = e.for_exchange(name);
        warn!(exchange = %name, "Handshake failed: {}", e);
        report(config, handler, &e);
        return;
    }

    if !set_state(state, LinkState::Open) {
        // Shut down while the handshake was in flight
        return;
    }
    info!(exchange = %name, role = %config.role, "Exchange opened");

    let mut open = OpenLink::new(link, state, name, cancel);
    if let Err(e) = handler.opened(&mut open).await {
        if cancel.is_cancelled() {
            return;
        }
        warn!(exchange = %name, "Open handler failed: {}", e);
        report(config, handler, &e);
    }

    while open.is_open() {
        tokio::select! {
            _ = cancel.cancelled() => return,
            inbound = open.recv() => match inbound {
                None => {
                    info!(exchange = %name, "Exchange closed by peer");
                    break;
                }
                Some(Err(e)) => {
                    let e = e.for_exchange(name);
                    warn!(exchange = %name, "Transport error: {}", e);
                    report(config, handler, &e);
                    break;
                }
                Some(Ok(WireMessage::Text(text))) => {
                    let e = ChannelError::UnexpectedText { exchange: name.to_string(), text };
                    error!(exchange = %name, "{}", e);
                    handler.error(&e);
                }
                Some(Ok(WireMessage::Binary(data))) => {
                    trace!(exchange = %name, "Received {} bytes", data.len());
                    handler.message(data);
                }
            },
            _ = handler.outbound_ready() => {
                if let Err(e) = handler.flush(&mut open).await {
                    if cancel.is_cancelled() {
                        return;
                    }
                    warn!(exchange = %name, "Send failed: {}", e);
                    report(config, handler, &e);
                }
            }
        }
    }
}
