//! Exchange identity and control packets
//!
//! Every exchange shares one endpoint URL. The gateway routes a connection to a
//! logical stream using only the handshake sent right after the socket opens.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::OperatorCommand;
use crate::{ChannelError, Result};

/// Composite camera frames (image + depth + status).
pub const CAMERA_EXCHANGE: &str = "camera0";

/// Robot state documents.
pub const STATE_EXCHANGE: &str = "state";

/// Operator commands (push role).
pub const COMMANDS_EXCHANGE: &str = "commands";

/// Bare JPEG color stream.
pub const RGB_EXCHANGE: &str = "rgbjpeg";

/// Direction of an exchange from the console's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Console consumes messages published by the robot
    Pull,
    /// Console produces messages for the robot
    Push,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Pull => "pull",
            Role::Push => "push",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static credentials attached to every outbound message.
///
/// The access token is treated as opaque credential material and redacted in
/// debug output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub robot_name: String,
    pub access_token: String,
}

impl Credentials {
    pub fn new(robot_name: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self { robot_name: robot_name.into(), access_token: access_token.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("robot_name", &self.robot_name)
            .field("access_token", &format_args!("<redacted:{} bytes>", self.access_token.len()))
            .finish()
    }
}

/// First message on every freshly opened link.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub command: Role,
    pub exchange: String,
    pub robot_name: String,
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

impl Handshake {
    pub fn new(role: Role, exchange: impl Into<String>, credentials: &Credentials) -> Self {
        Self {
            command: role,
            exchange: exchange.into(),
            robot_name: credentials.robot_name.clone(),
            access_token: credentials.access_token.clone(),
        }
    }

    /// JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ChannelError::serialization("handshake", e))
    }
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("command", &self.command)
            .field("exchange", &self.exchange)
            .field("robot_name", &self.robot_name)
            .field("access_token", &format_args!("<redacted:{} bytes>", self.access_token.len()))
            .finish()
    }
}

/// One queued command, wrapped with routing and credentials.
///
/// Envelopes are built at enqueue time and never merged or deduplicated.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub command: Role,
    pub exchange: String,
    pub robot_name: String,
    pub message: OperatorCommand,
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

impl OutboundEnvelope {
    pub fn new(
        exchange: impl Into<String>,
        credentials: &Credentials,
        message: OperatorCommand,
    ) -> Self {
        Self {
            command: Role::Push,
            exchange: exchange.into(),
            robot_name: credentials.robot_name.clone(),
            message,
            access_token: credentials.access_token.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ChannelError::serialization("command envelope", e))
    }
}

impl fmt::Debug for OutboundEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundEnvelope")
            .field("exchange", &self.exchange)
            .field("robot_name", &self.robot_name)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}
