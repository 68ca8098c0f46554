//! Error types for the channel protocol layer.
//!
//! Nothing in this crate treats an error as fatal. Framing and payload errors are
//! logged and the offending frame (or payload) is dropped; transport errors end the
//! current link and the exchange reconnects. The enum still carries enough context
//! to tell callers what happened when they opt in to error notifications.
//!
//! ## Error Categories
//!
//! - **Transport Errors**: connect failures, send failures, links closed by the peer
//! - **Framing Errors**: unknown frame tags, length fields that overrun the message
//! - **Payload Errors**: a single image/depth/status payload that failed to decode
//! - **Protocol Errors**: text messages on exchanges that only carry binary data
//! - **Configuration Errors**: invalid or unreadable console settings
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use robowire::ChannelError;
//!
//! let error = ChannelError::transport("connection refused");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::types::StreamKind;

/// Result type alias for channel operations.
pub type Result<T, E = ChannelError> = std::result::Result<T, E>;

/// Main error type for channel operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ChannelError {
    #[error("Transport error on '{exchange}': {reason}")]
    Transport {
        exchange: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transport closed on '{exchange}'")]
    TransportClosed { exchange: String },

    #[error("Unexpected text payload on '{exchange}': {text}")]
    UnexpectedText { exchange: String, text: String },

    #[error("Unrecognized frame tag {tag} (only tag 1 is defined)")]
    UnrecognizedFrame { tag: u8 },

    #[error("Malformed frame: header declares {declared} bytes, message has {actual}")]
    MalformedFrame { declared: u64, actual: usize },

    #[error("Payload of {size} bytes exceeds the frame limit of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Failed to decode {stream} payload: {details}")]
    PayloadDecode { stream: StreamKind, details: String },

    #[error("Serialization error in {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String, path: Option<PathBuf> },

    #[error("Exchange '{exchange}' has been shut down")]
    Shutdown { exchange: String },
}

impl ChannelError {
    /// Returns whether a fresh attempt (new link, next frame) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChannelError::Transport { .. } => true,
            ChannelError::TransportClosed { .. } => true,
            ChannelError::UnexpectedText { .. } => true,
            ChannelError::UnrecognizedFrame { .. } => true,
            ChannelError::MalformedFrame { .. } => true,
            ChannelError::PayloadDecode { .. } => true,
            ChannelError::PayloadTooLarge { .. } => false,
            ChannelError::Serialization { .. } => false,
            ChannelError::Config { .. } => false,
            ChannelError::Shutdown { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ChannelError::Transport { .. } => vec![
                "Check that the robot gateway endpoint is reachable",
                "Verify the endpoint URL scheme (ws:// or wss://)",
                "Wait for the automatic reconnect",
            ],
            ChannelError::TransportClosed { .. } => {
                vec!["No action needed, the exchange reconnects automatically"]
            }
            ChannelError::UnexpectedText { .. } => vec![
                "Check the gateway logs for the rejected request",
                "Verify the robot name and access token",
            ],
            ChannelError::UnrecognizedFrame { .. } => vec![
                "Check that the robot firmware sends composite frames (tag 1)",
                "Update the console to a version that understands the new frame type",
            ],
            ChannelError::MalformedFrame { .. } => vec![
                "Check the robot-side frame encoder",
                "Look for truncated messages at the gateway",
            ],
            ChannelError::PayloadDecode { .. } => vec![
                "Check the payload encoding on the robot side",
                "Ignore if it only happens sporadically, the next frame replaces it",
            ],
            ChannelError::PayloadTooLarge { .. } => {
                vec!["Split or downscale the payload before framing it"]
            }
            ChannelError::Serialization { .. } => vec![
                "Check that robot data and command payloads are valid JSON values",
            ],
            ChannelError::Config { .. } => vec![
                "Check the settings file syntax",
                "Provide an endpoint, robot name and access token",
            ],
            ChannelError::Shutdown { .. } => vec![
                "Create a new console or operator after shutting down",
            ],
        }
    }

    /// Helper constructor for transport errors without an exchange context.
    pub fn transport(reason: impl Into<String>) -> Self {
        ChannelError::Transport { exchange: String::new(), reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        ChannelError::Transport { exchange: String::new(), reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for payload decode failures.
    pub fn payload_decode(stream: StreamKind, details: impl Into<String>) -> Self {
        ChannelError::PayloadDecode { stream, details: details.into() }
    }

    /// Helper constructor for JSON (de)serialization failures.
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        ChannelError::Serialization { context: context.into(), source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        ChannelError::Config { reason: reason.into(), path: None }
    }

    /// Attach the exchange name to transport-level errors.
    ///
    /// Links do not know which exchange they serve, so the exchange task stamps
    /// errors on the way out.
    pub fn for_exchange(self, name: &str) -> Self {
        match self {
            ChannelError::Transport { reason, source, .. } => {
                ChannelError::Transport { exchange: name.to_string(), reason, source }
            }
            ChannelError::TransportClosed { .. } => {
                ChannelError::TransportClosed { exchange: name.to_string() }
            }
            ChannelError::UnexpectedText { text, .. } => {
                ChannelError::UnexpectedText { exchange: name.to_string(), text }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            exchange in "[a-z0-9]{1,16}",
            reason in ".*",
            tag in 0u8..=255u8,
            declared in 13u64..1_000_000u64,
            actual in 0usize..1_000_000usize
          ) {
            let transport = ChannelError::transport(reason.clone()).for_exchange(&exchange);
            let msg = transport.to_string();
            prop_assert!(msg.contains(&exchange));
            prop_assert!(msg.contains(&reason));

            let tag_msg = ChannelError::UnrecognizedFrame { tag }.to_string();
            prop_assert!(tag_msg.contains(&tag.to_string()));

            let malformed = ChannelError::MalformedFrame { declared, actual }.to_string();
            prop_assert!(malformed.contains(&declared.to_string()));
            prop_assert!(malformed.contains(&actual.to_string()));
          }

          #[test]
          fn transport_source_chain_is_preserved(base_message in ".+") {
            let err = ChannelError::transport_with_source(
                "connect failed",
                Box::new(std::io::Error::other(base_message.clone())),
            );
            let source = std::error::Error::source(&err).map(|s| s.to_string());
            prop_assert_eq!(source, Some(base_message));
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<ChannelError>();

        let error = ChannelError::transport("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn framing_errors_are_recovered_locally() {
        assert!(ChannelError::UnrecognizedFrame { tag: 7 }.is_retryable());
        assert!(ChannelError::MalformedFrame { declared: 20, actual: 13 }.is_retryable());
        assert!(ChannelError::payload_decode(StreamKind::Depth, "bad png").is_retryable());
        assert!(!ChannelError::config("missing endpoint").is_retryable());
        assert!(!ChannelError::Shutdown { exchange: "commands".into() }.is_retryable());
    }

    #[test]
    fn recovery_suggestions_are_never_empty() {
        let errors = [
            ChannelError::transport("refused"),
            ChannelError::TransportClosed { exchange: "state".into() },
            ChannelError::UnexpectedText { exchange: "camera0".into(), text: "denied".into() },
            ChannelError::UnrecognizedFrame { tag: 2 },
            ChannelError::MalformedFrame { declared: 99, actual: 20 },
            ChannelError::payload_decode(StreamKind::Status, "eof"),
            ChannelError::config("empty"),
            ChannelError::Shutdown { exchange: "commands".into() },
        ];
        for error in &errors {
            assert!(!error.recovery_suggestions().is_empty(), "{error}");
        }
    }

    #[test]
    fn for_exchange_leaves_framing_errors_untouched() {
        let err = ChannelError::UnrecognizedFrame { tag: 3 }.for_exchange("camera0");
        assert!(matches!(err, ChannelError::UnrecognizedFrame { tag: 3 }));

        let err = ChannelError::TransportClosed { exchange: String::new() }.for_exchange("state");
        assert_eq!(err.to_string(), "Transport closed on 'state'");
    }
}
