//! Pull-role exchanges that feed broadcasts

pub mod rgb;
pub mod telemetry;

pub use rgb::RgbStream;
pub use telemetry::{CompositeFrameHandler, FrameChannels, StateHandler, TelemetryReceiver};
