//! Channel layer for a robot operator console.
//!
//! Robowire keeps a set of WebSocket exchanges to a robot gateway alive and turns
//! their traffic into typed streams and an ordered command queue.
//!
//! # Features
//!
//! - **Resilient exchanges**: one link per exchange, handshake on every open,
//!   reconnect after every close or error until shut down
//! - **Composite frames**: camera messages split zero-copy into image, depth and
//!   status payloads
//! - **Latest-value broadcasts**: late subscribers see the most recent value first;
//!   subscriptions can be rate limited
//! - **Ordered commands**: FIFO queue that drains only while the link is open
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use robowire::{ConsoleSettings, Robowire, UpdateRate};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> robowire::Result<()> {
//!     let settings = ConsoleSettings::new("ws://gateway.local:8080/ws", "r2d2", "token");
//!     let console = Robowire::connect(settings)?;
//!
//!     let mut states = console.telemetry().subscribe_states(UpdateRate::Max(10));
//!     console.ask_for_manual()?;
//!
//!     while let Some(state) = states.next().await {
//!         println!("joints: {:?}", state.joints);
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

// Wire level
pub mod frame;
pub mod transport;

// Exchanges and their consumers
pub mod broadcast;
pub mod exchange;
pub mod queue;
pub mod stream;

// Console surfaces
pub mod config;
pub mod console;
pub mod operator;
pub mod receivers;

// Core exports
pub use error::*;
pub use types::*;

pub use broadcast::Broadcast;
pub use config::{ConsoleSettings, ExchangeNames};
pub use console::OperatorConsole;
pub use exchange::{
    ErrorHook, ExchangeConfig, ExchangeConnection, ExchangeHandler, LinkState, OpenLink,
};
pub use frame::CompositeFrame;
pub use operator::NetworkOperator;
pub use queue::CommandQueue;
pub use receivers::{RgbStream, TelemetryReceiver};
pub use transport::{Connector, Link, WebSocketConnector, WireMessage};

/// Entry point for operator consoles.
///
/// # Examples
///
/// ```rust,no_run
/// use robowire::Robowire;
///
/// #[tokio::main]
/// async fn main() -> robowire::Result<()> {
///     let console = Robowire::open("console.yaml")?;
///     console.go_home_safely()?;
///     console.close().await;
///     Ok(())
/// }
/// ```
pub struct Robowire;

impl Robowire {
    /// Connect a console over WebSockets.
    ///
    /// Exchanges start connecting immediately and keep retrying in the background;
    /// this only fails for invalid settings.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(settings: ConsoleSettings) -> Result<OperatorConsole> {
        OperatorConsole::connect(settings)
    }

    /// Load settings from a YAML file and connect.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML does not describe valid settings
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<OperatorConsole> {
        OperatorConsole::connect(ConsoleSettings::load(path)?)
    }
}
