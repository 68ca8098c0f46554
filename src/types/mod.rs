//! Core types shared by the exchanges.
//!
//! ## Overview
//!
//! - [`Handshake`] and [`OutboundEnvelope`] are the JSON control and command packets
//! - [`OperatorCommand`] is a tagged command value stamped with a [`RobotData`] snapshot
//! - [`RobotImageData`], [`DepthRaster`], [`RobotState`] and [`RobotData`] are the values
//!   published on the telemetry broadcasts
//! - [`UpdateRate`] limits how often a subscriber sees new values
//!
//! ## Usage Example
//!
//! ```rust
//! use robowire::types::{Credentials, Handshake, Role, CAMERA_EXCHANGE};
//!
//! let credentials = Credentials::new("r2d2", "abc");
//! let handshake = Handshake::new(Role::Pull, CAMERA_EXCHANGE, &credentials);
//! assert_eq!(
//!     handshake.to_json().unwrap(),
//!     r#"{"command":"pull","exchange":"camera0","robot_name":"r2d2","accessToken":"abc"}"#
//! );
//! ```

mod command;
mod exchange;
mod telemetry;
mod update_rate;

pub use command::{CommandKind, OperatorCommand, RobotData, ops};
pub use exchange::{
    CAMERA_EXCHANGE, COMMANDS_EXCHANGE, Credentials, Handshake, OutboundEnvelope, RGB_EXCHANGE,
    Role, STATE_EXCHANGE,
};
pub use telemetry::{
    DEPTH_VISUAL_GAIN, DepthRaster, JPEG_MIME, RobotImageData, RobotState, StreamKind,
};
pub use update_rate::UpdateRate;
