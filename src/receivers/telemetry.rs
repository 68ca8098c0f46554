//! Camera and state telemetry
//!
//! Two pull exchanges feed four broadcasts:
//!
//! - `camera0` carries composite frames; each frame is split and its image, depth
//!   and status payloads are decoded in separate tasks and published independently
//! - `state` carries JSON robot state documents
//!
//! Payload decodes are not ordered against each other, so a stream may observe a
//! newer frame's payload before an older one's. Subscribers only ever care about
//! the latest value.

use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::ChannelError;
use crate::broadcast::Broadcast;
use crate::config::ConsoleSettings;
use crate::exchange::{ExchangeConnection, ExchangeHandler, LinkState};
use crate::frame;
use crate::transport::Connector;
use crate::types::{
    DepthRaster, RobotData, RobotImageData, RobotState, Role, StreamKind, UpdateRate,
};

/// Broadcasts fed by the camera exchange
#[derive(Debug, Clone, Default)]
pub struct FrameChannels {
    pub images: Broadcast<RobotImageData>,
    pub depth: Broadcast<DepthRaster>,
    pub status: Broadcast<RobotData>,
}

/// Splits composite frames and publishes their payloads
pub struct CompositeFrameHandler {
    channels: FrameChannels,
    frames: u64,
}

impl CompositeFrameHandler {
    pub fn new(channels: FrameChannels) -> Self {
        Self { channels, frames: 0 }
    }
}

#[async_trait::async_trait]
impl ExchangeHandler for CompositeFrameHandler {
    fn message(&mut self, data: Bytes) {
        let frame = match frame::decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping camera frame: {}", e);
                return;
            }
        };
        self.frames += 1;
        trace!("Camera frame {}", self.frames);

        let images = self.channels.images.clone();
        tokio::spawn(async move {
            images.publish(RobotImageData::jpeg(frame.image));
        });

        let depth = self.channels.depth.clone();
        let depth_bytes = frame.depth;
        tokio::task::spawn_blocking(move || match DepthRaster::from_png(&depth_bytes) {
            Ok(raster) => depth.publish(raster),
            Err(e) => warn!("Skipping depth map: {}", e),
        });

        let status = self.channels.status.clone();
        let status_bytes = frame.status;
        tokio::spawn(async move {
            match serde_json::from_slice::<serde_json::Value>(&status_bytes) {
                Ok(value) => status.publish(RobotData(value)),
                Err(e) => {
                    let e = ChannelError::payload_decode(StreamKind::Status, e.to_string());
                    warn!("Skipping status: {}", e);
                }
            }
        });
    }

    fn closed(&mut self) {
        debug!("Camera link lost after {} frames", self.frames);
    }
}

/// Publishes robot state documents
pub struct StateHandler {
    states: Broadcast<RobotState>,
}

impl StateHandler {
    pub fn new(states: Broadcast<RobotState>) -> Self {
        Self { states }
    }
}

#[async_trait::async_trait]
impl ExchangeHandler for StateHandler {
    fn message(&mut self, data: Bytes) {
        match serde_json::from_slice::<RobotState>(&data) {
            Ok(state) => self.states.publish(state),
            Err(e) => {
                let e = ChannelError::payload_decode(StreamKind::State, e.to_string());
                warn!("Skipping robot state: {}", e);
            }
        }
    }
}

/// Receives camera frames and robot state
pub struct TelemetryReceiver {
    frames: FrameChannels,
    states: Broadcast<RobotState>,
    camera: ExchangeConnection,
    state: ExchangeConnection,
}

impl TelemetryReceiver {
    /// Open the camera and state exchanges.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(connector: Arc<dyn Connector>, settings: &ConsoleSettings) -> Self {
        let frames = FrameChannels::default();
        let states = Broadcast::new();

        let camera = ExchangeConnection::open(
            Arc::clone(&connector),
            settings.exchange_config(&settings.exchanges.camera, Role::Pull),
            CompositeFrameHandler::new(frames.clone()),
        );
        let state = ExchangeConnection::open(
            connector,
            settings.exchange_config(&settings.exchanges.state, Role::Pull),
            StateHandler::new(states.clone()),
        );

        info!(robot = %settings.robot_name, "Telemetry receiver started");
        Self { frames, states, camera, state }
    }

    pub fn images(&self) -> &Broadcast<RobotImageData> {
        &self.frames.images
    }

    pub fn depth(&self) -> &Broadcast<DepthRaster> {
        &self.frames.depth
    }

    /// Status documents from camera frames
    pub fn robot_data(&self) -> &Broadcast<RobotData> {
        &self.frames.status
    }

    pub fn states(&self) -> &Broadcast<RobotState> {
        &self.states
    }

    pub fn subscribe_images(&self, rate: UpdateRate) -> BoxStream<'static, Arc<RobotImageData>> {
        self.frames.images.subscribe_with_rate(rate)
    }

    pub fn subscribe_depth(&self, rate: UpdateRate) -> BoxStream<'static, Arc<DepthRaster>> {
        self.frames.depth.subscribe_with_rate(rate)
    }

    pub fn subscribe_robot_data(&self, rate: UpdateRate) -> BoxStream<'static, Arc<RobotData>> {
        self.frames.status.subscribe_with_rate(rate)
    }

    pub fn subscribe_states(&self, rate: UpdateRate) -> BoxStream<'static, Arc<RobotState>> {
        self.states.subscribe_with_rate(rate)
    }

    pub fn camera_state(&self) -> LinkState {
        self.camera.state()
    }

    pub fn state_link_state(&self) -> LinkState {
        self.state.state()
    }

    /// Wait until both exchanges are open
    pub async fn wait_until_open(&self) {
        self.camera.wait_for(LinkState::Open).await;
        self.state.wait_for(LinkState::Open).await;
    }

    pub fn shutdown(&self) {
        self.camera.shutdown();
        self.state.shutdown();
    }

    /// Shut down and wait for both exchange tasks
    pub async fn close(self) {
        self.camera.close().await;
        self.state.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockConnector, MockServer, TEST_TIMEOUT};
    use futures::StreamExt;
    use image::{ImageBuffer, Luma};
    use std::io::Cursor;
    use std::time::Duration;

    fn depth_png() -> Vec<u8> {
        let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_raw(2, 1, vec![10, 20]).unwrap();
        let mut out = Cursor::new(Vec::new());
        buffer.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    async fn next<T>(stream: &mut BoxStream<'static, Arc<T>>) -> Arc<T> {
        tokio::time::timeout(TEST_TIMEOUT, stream.next()).await.unwrap().unwrap()
    }

    /// Accept both links; returns (camera, state) remotes after their handshakes
    async fn accept_both(
        server: &MockServer,
    ) -> (crate::test_utils::MockRemote, crate::test_utils::MockRemote) {
        let mut a = server.accept().await;
        let mut b = server.accept().await;
        let ha = a.recv_json().await;
        let hb = b.recv_json().await;
        assert_eq!(ha["command"], "pull");
        assert_eq!(hb["command"], "pull");
        if ha["exchange"] == "camera0" { (a, b) } else { (b, a) }
    }

    #[tokio::test]
    async fn composite_frame_feeds_three_streams() {
        let (connector, server) = MockConnector::new();
        let settings = ConsoleSettings::new("ws://robot.test", "r2d2", "abc");
        let receiver = TelemetryReceiver::connect(Arc::new(connector), &settings);
        let (camera, _state) = accept_both(&server).await;
        receiver.wait_until_open().await;

        let mut images = receiver.subscribe_images(UpdateRate::Native);
        let mut depth = receiver.subscribe_depth(UpdateRate::Native);
        let mut data = receiver.subscribe_robot_data(UpdateRate::Native);

        let frame = frame::encode(b"\xFF\xD8jpeg", &depth_png(), br#"{"battery":0.5}"#).unwrap();
        camera.send_binary(frame);

        let image = next(&mut images).await;
        assert_eq!(image.data.as_ref(), b"\xFF\xD8jpeg");
        assert_eq!(image.mime, "image/jpg");

        let raster = next(&mut depth).await;
        assert_eq!(raster.samples, vec![10, 20]);

        let status = next(&mut data).await;
        assert_eq!(status.0["battery"], 0.5);
    }

    #[tokio::test]
    async fn bad_depth_does_not_block_other_payloads() {
        let (connector, server) = MockConnector::new();
        let settings = ConsoleSettings::new("ws://robot.test", "r2d2", "abc");
        let receiver = TelemetryReceiver::connect(Arc::new(connector), &settings);
        let (camera, _state) = accept_both(&server).await;
        receiver.wait_until_open().await;

        let mut images = receiver.subscribe_images(UpdateRate::Native);
        let mut data = receiver.subscribe_robot_data(UpdateRate::Native);

        camera.send_binary(frame::encode(b"img", b"not a png", b"{}").unwrap());

        assert_eq!(next(&mut images).await.data.as_ref(), b"img");
        assert_eq!(next(&mut data).await.0, serde_json::json!({}));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(receiver.depth().latest().is_none());
    }

    #[tokio::test]
    async fn unrecognized_and_malformed_frames_publish_nothing() {
        let (connector, server) = MockConnector::new();
        let settings = ConsoleSettings::new("ws://robot.test", "r2d2", "abc");
        let receiver = TelemetryReceiver::connect(Arc::new(connector), &settings);
        let (camera, _state) = accept_both(&server).await;
        receiver.wait_until_open().await;

        // Tag 2 with a well-formed header, then tag 1 declaring more than it carries
        let mut unknown_tag = frame::encode(b"img", b"", b"{}").unwrap().to_vec();
        unknown_tag[0] = 2;
        camera.send_binary(unknown_tag);
        camera.send_binary(vec![1u8, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 2]);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(receiver.images().latest().is_none());
        assert!(receiver.depth().latest().is_none());
        assert!(receiver.robot_data().latest().is_none());
        assert_eq!(receiver.camera_state(), LinkState::Open);
    }

    #[tokio::test]
    async fn exchange_keeps_decoding_after_bad_frames() {
        let (connector, server) = MockConnector::new();
        let settings = ConsoleSettings::new("ws://robot.test", "r2d2", "abc");
        let receiver = TelemetryReceiver::connect(Arc::new(connector), &settings);
        let (camera, _state) = accept_both(&server).await;
        receiver.wait_until_open().await;

        let mut images = receiver.subscribe_images(UpdateRate::Native);
        camera.send_binary(vec![2u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        camera.send_binary(vec![1u8, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 2]);
        camera.send_binary(frame::encode(b"ok", b"", b"{}").unwrap());

        assert_eq!(next(&mut images).await.data.as_ref(), b"ok");
        assert_eq!(server.attempts(), 2);
    }

    #[tokio::test]
    async fn state_documents_are_republished() {
        let (connector, server) = MockConnector::new();
        let settings = ConsoleSettings::new("ws://robot.test", "r2d2", "abc");
        let receiver = TelemetryReceiver::connect(Arc::new(connector), &settings);
        let (_camera, state) = accept_both(&server).await;
        receiver.wait_until_open().await;

        let mut states = receiver.subscribe_states(UpdateRate::Native);
        state.send_binary(br#"{"joints":[0.0,1.5708],"mode":"manual"}"#.to_vec());

        let received = next(&mut states).await;
        assert_eq!(received.joints, Some(vec![0.0, 1.5708]));
        assert_eq!(received.extra["mode"], "manual");
    }

    #[tokio::test]
    async fn late_subscriber_gets_latest_state_after_reconnect() {
        let (connector, server) = MockConnector::new();
        let settings = ConsoleSettings::new("ws://robot.test", "r2d2", "abc");
        let receiver = TelemetryReceiver::connect(Arc::new(connector), &settings);
        let (_camera, mut state) = accept_both(&server).await;
        receiver.wait_until_open().await;

        let mut early = receiver.subscribe_states(UpdateRate::Native);
        state.send_binary(br#"{"seq":1}"#.to_vec());
        assert_eq!(next(&mut early).await.extra["seq"], 1);

        state.close();
        let mut state = server.accept().await;
        assert_eq!(state.recv_json().await["exchange"], "state");
        state.send_binary(br#"{"seq":2}"#.to_vec());
        assert_eq!(next(&mut early).await.extra["seq"], 2);

        let mut late = receiver.subscribe_states(UpdateRate::Native);
        assert_eq!(next(&mut late).await.extra["seq"], 2);

        receiver.close().await;
    }
}
