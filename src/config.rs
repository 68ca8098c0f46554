//! Console settings
//!
//! Settings are supplied once and stay fixed for the lifetime of the console:
//! every exchange uses the same endpoint and credentials. They can be built in code
//! or loaded from YAML:
//!
//! ```yaml
//! endpoint: ws://gateway.local:8080/ws
//! robot_name: r2d2
//! access_token: abc
//! reconnect_delay_ms: 0
//! exchanges:
//!   camera: camera0
//!   state: state
//!   commands: commands
//!   rgb: rgbjpeg
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::exchange::{ErrorHook, ExchangeConfig};
use crate::types::{
    CAMERA_EXCHANGE, COMMANDS_EXCHANGE, Credentials, RGB_EXCHANGE, Role, STATE_EXCHANGE,
};
use crate::{ChannelError, Result};

/// Exchange names announced in handshakes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeNames {
    pub camera: String,
    pub state: String,
    pub commands: String,
    pub rgb: String,
}

impl Default for ExchangeNames {
    fn default() -> Self {
        Self {
            camera: CAMERA_EXCHANGE.to_string(),
            state: STATE_EXCHANGE.to_string(),
            commands: COMMANDS_EXCHANGE.to_string(),
            rgb: RGB_EXCHANGE.to_string(),
        }
    }
}

/// Connection settings shared by all exchanges of one console
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    /// Gateway WebSocket URL
    #[serde(alias = "data_ws_url")]
    pub endpoint: String,
    pub robot_name: String,
    #[serde(default)]
    pub access_token: String,
    /// Delay before reconnecting; 0 reconnects immediately
    #[serde(default)]
    pub reconnect_delay_ms: u64,
    #[serde(default)]
    pub exchanges: ExchangeNames,
}

impl ConsoleSettings {
    pub fn new(
        endpoint: impl Into<String>,
        robot_name: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            robot_name: robot_name.into(),
            access_token: access_token.into(),
            reconnect_delay_ms: 0,
            exchanges: ExchangeNames::default(),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    /// Parse and validate settings from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| ChannelError::config(format!("invalid settings YAML: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load and validate settings from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading console settings from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| ChannelError::Config {
            reason: format!("cannot read settings: {}", e),
            path: Some(path.to_path_buf()),
        })?;
        Self::from_yaml_str(&text).map_err(|e| match e {
            ChannelError::Config { reason, .. } => {
                ChannelError::Config { reason, path: Some(path.to_path_buf()) }
            }
            other => other,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(ChannelError::config(format!(
                "endpoint '{}' must start with ws:// or wss://",
                self.endpoint
            )));
        }
        if self.robot_name.trim().is_empty() {
            return Err(ChannelError::config("robot_name must not be empty"));
        }
        let names = &self.exchanges;
        for (field, name) in [
            ("camera", &names.camera),
            ("state", &names.state),
            ("commands", &names.commands),
            ("rgb", &names.rgb),
        ] {
            if name.trim().is_empty() {
                return Err(ChannelError::config(format!("exchange name '{}' is empty", field)));
            }
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.robot_name.clone(), self.access_token.clone())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Exchange description for one of this console's exchanges
    pub fn exchange_config(&self, exchange: &str, role: Role) -> ExchangeConfig {
        ExchangeConfig::new(self.endpoint.clone(), exchange, role, self.credentials())
            .with_reconnect_delay(self.reconnect_delay())
    }

    pub(crate) fn exchange_config_with_hook(
        &self,
        exchange: &str,
        role: Role,
        hook: Option<ErrorHook>,
    ) -> ExchangeConfig {
        let config = self.exchange_config(exchange, role);
        match hook {
            Some(hook) => config.with_error_hook(hook),
            None => config,
        }
    }
}

impl fmt::Debug for ConsoleSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSettings")
            .field("endpoint", &self.endpoint)
            .field("robot_name", &self.robot_name)
            .field("access_token", &format_args!("<redacted:{} bytes>", self.access_token.len()))
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .field("exchanges", &self.exchanges)
            .finish()
    }
}
