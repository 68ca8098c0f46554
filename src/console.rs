//! Operator console
//!
//! Ties the telemetry receiver and the network operator to one set of settings.
//! Every command is stamped with the robot data snapshot current at the time it is
//! built, which is the latest status document from the camera exchange.

use std::sync::Arc;
use tracing::info;

use crate::Result;
use crate::config::ConsoleSettings;
use crate::operator::NetworkOperator;
use crate::receivers::TelemetryReceiver;
use crate::transport::{Connector, WebSocketConnector};
use crate::types::{OperatorCommand, RobotData, ops};

/// Telemetry in, commands out, for one robot
pub struct OperatorConsole {
    settings: ConsoleSettings,
    telemetry: TelemetryReceiver,
    operator: NetworkOperator,
}

impl OperatorConsole {
    /// Connect over WebSockets.
    ///
    /// Returns as soon as the exchanges are started; they keep connecting in the
    /// background.
    pub fn connect(settings: ConsoleSettings) -> Result<Self> {
        Self::connect_with(Arc::new(WebSocketConnector), settings)
    }

    /// Connect through a custom transport
    pub fn connect_with(connector: Arc<dyn Connector>, settings: ConsoleSettings) -> Result<Self> {
        settings.validate()?;
        let telemetry = TelemetryReceiver::connect(Arc::clone(&connector), &settings);
        let operator = NetworkOperator::connect(connector, &settings);
        info!(robot = %settings.robot_name, endpoint = %settings.endpoint, "Operator console connected");
        Ok(Self { settings, telemetry, operator })
    }

    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }

    pub fn telemetry(&self) -> &TelemetryReceiver {
        &self.telemetry
    }

    pub fn operator(&self) -> &NetworkOperator {
        &self.operator
    }

    /// Latest robot data, or an empty document before the first status arrives
    pub fn robot_data(&self) -> RobotData {
        self.telemetry.robot_data().latest().map(|data| (*data).clone()).unwrap_or_default()
    }

    /// Queue a named operation
    pub fn send_op(&self, op: &str) -> Result<()> {
        self.operator.enqueue(OperatorCommand::operation(op, self.robot_data()))
    }

    /// Queue a joint target (degrees)
    pub fn set_joints(&self, joints: Vec<f64>) -> Result<()> {
        self.operator.enqueue(OperatorCommand::set_joints(joints, self.robot_data()))
    }

    pub fn set_tag(&self, tag: u32) -> Result<()> {
        self.operator.enqueue(OperatorCommand::set_tag(tag, self.robot_data()))
    }

    pub fn ask_for_manual(&self) -> Result<()> {
        self.send_op(ops::ASK_FOR_MANUAL)
    }

    pub fn ask_for_idle(&self) -> Result<()> {
        self.send_op(ops::ASK_FOR_IDLE)
    }

    pub fn tag_detection(&self) -> Result<()> {
        self.send_op(ops::TAG_DETECTION)
    }

    pub fn tag_calibration(&self) -> Result<()> {
        self.send_op(ops::TAG_CALIBRATION)
    }

    pub fn vacuum_on(&self) -> Result<()> {
        self.send_op(ops::VACUUM_ON)
    }

    pub fn vacuum_off(&self) -> Result<()> {
        self.send_op(ops::VACUUM_OFF)
    }

    pub fn go_home_safely(&self) -> Result<()> {
        self.send_op(ops::GO_HOME_SAFELY)
    }

    /// Wait until every exchange is open
    pub async fn wait_until_open(&self) {
        self.telemetry.wait_until_open().await;
        self.operator.wait_until_open().await;
    }

    pub fn shutdown(&self) {
        self.telemetry.shutdown();
        self.operator.shutdown();
    }

    pub async fn close(self) {
        self.telemetry.close().await;
        self.operator.close().await;
    }
}
