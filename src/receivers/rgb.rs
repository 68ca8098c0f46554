//! Bare JPEG stream on the `rgbjpeg` exchange
//!
//! Unlike `camera0`, every binary message is a complete JPEG with no header.
//! Transport errors are passed to the caller's hook as well as logged.

use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::{info, trace};

use crate::broadcast::Broadcast;
use crate::config::ConsoleSettings;
use crate::exchange::{ErrorHook, ExchangeConnection, ExchangeHandler, LinkState};
use crate::transport::Connector;
use crate::types::{RobotImageData, Role, UpdateRate};

struct JpegHandler {
    images: Broadcast<RobotImageData>,
}

#[async_trait::async_trait]
impl ExchangeHandler for JpegHandler {
    fn message(&mut self, data: Bytes) {
        trace!("RGB image, {} bytes", data.len());
        self.images.publish(RobotImageData::jpeg(data));
    }
}

/// Receives color images from the `rgbjpeg` exchange
pub struct RgbStream {
    images: Broadcast<RobotImageData>,
    connection: ExchangeConnection,
}

impl RgbStream {
    /// Open the exchange; `on_error` sees every transport error.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(
        connector: Arc<dyn Connector>,
        settings: &ConsoleSettings,
        on_error: Option<ErrorHook>,
    ) -> Self {
        let images = Broadcast::new();
        let config = settings.exchange_config_with_hook(&settings.exchanges.rgb, Role::Pull, on_error);
        let connection = ExchangeConnection::open(connector, config, JpegHandler { images: images.clone() });
        info!(robot = %settings.robot_name, "RGB stream started");
        Self { images, connection }
    }

    pub fn images(&self) -> &Broadcast<RobotImageData> {
        &self.images
    }

    pub fn subscribe(&self, rate: UpdateRate) -> BoxStream<'static, Arc<RobotImageData>> {
        self.images.subscribe_with_rate(rate)
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
