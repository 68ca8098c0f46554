//! Operator commands

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named operations understood by the robot controller.
pub mod ops {
    pub const ASK_FOR_MANUAL: &str = "ask_for_manual";
    pub const ASK_FOR_IDLE: &str = "ask_for_idle";
    pub const TAG_DETECTION: &str = "calibration/tag_detection";
    /// Spelled as the robot controller expects it.
    pub const TAG_CALIBRATION: &str = "calibartion/tag_calibration";
    pub const VACUUM_ON: &str = "manual_vacuum_on";
    pub const VACUUM_OFF: &str = "manual_vacuum_off";
    pub const GO_HOME_SAFELY: &str = "go_home_safely";
    pub const SET_JOINTS: &str = "set_joints";
    pub const SET_TAG: &str = "set_tag";
}

/// Latest status document published by the robot.
///
/// Passed through unparsed into every command so the controller can correlate a
/// command with the telemetry the operator was looking at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RobotData(pub serde_json::Value);

impl From<serde_json::Value> for RobotData {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Command-specific payload
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    /// Bare named operation
    Operation,
    /// Target joint vector (degrees)
    SetJoints(Vec<f64>),
    /// Calibration tag identifier
    SetTag(u32),
}

/// A command ready to be queued.
///
/// Immutable once built; the robot data snapshot is taken at construction.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireCommand", from = "WireCommand")]
pub struct OperatorCommand {
    op: String,
    kind: CommandKind,
    robot_data: RobotData,
}

impl OperatorCommand {
    pub fn operation(op: impl Into<String>, robot_data: RobotData) -> Self {
        Self { op: op.into(), kind: CommandKind::Operation, robot_data }
    }

    pub fn set_joints(joints: Vec<f64>, robot_data: RobotData) -> Self {
        Self { op: ops::SET_JOINTS.to_string(), kind: CommandKind::SetJoints(joints), robot_data }
    }

    pub fn set_tag(tag: u32, robot_data: RobotData) -> Self {
        Self { op: ops::SET_TAG.to_string(), kind: CommandKind::SetTag(tag), robot_data }
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn robot_data(&self) -> &RobotData {
        &self.robot_data
    }
}

impl fmt::Debug for OperatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Robot data can be large; leave it out of logs.
        f.debug_struct("OperatorCommand").field("op", &self.op).field("kind", &self.kind).finish()
    }
}

#[derive(Serialize, Deserialize)]
struct WireCommand {
    op: String,
    #[serde(default)]
    robot_data: RobotData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    joints: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<u32>,
}

impl From<OperatorCommand> for WireCommand {
    fn from(command: OperatorCommand) -> Self {
        let (joints, tag) = match command.kind {
            CommandKind::Operation => (None, None),
            CommandKind::SetJoints(joints) => (Some(joints), None),
            CommandKind::SetTag(tag) => (None, Some(tag)),
        };
        Self { op: command.op, robot_data: command.robot_data, joints, tag }
    }
}

impl From<WireCommand> for OperatorCommand {
    fn from(wire: WireCommand) -> Self {
        let kind = match (wire.joints, wire.tag) {
            (Some(joints), _) => CommandKind::SetJoints(joints),
            (None, Some(tag)) => CommandKind::SetTag(tag),
            (None, None) => CommandKind::Operation,
        };
        Self { op: wire.op, kind, robot_data: wire.robot_data }
    }
}
