//! Robot configuration and robot status records

use super::meta::Meta;
use super::scope::Scope;
use crate::store::Record;
use serde::{Deserialize, Serialize};

/// State-machine phases during which a robot cannot take part in auctions
pub const BLOCKED_PHASES: [&str; 3] = [
    "moveTrolley_waitingForErrorRecovery",
    "pickPackPass_waitingForErrorRecovery",
    "robotError",
];

/// Phase reported while the robot charges; robots keep bidding while
/// charging as long as the battery is above the idle threshold
pub const CHARGING_PHASE: &str = "charging";

/// Per-robot scope binding, run mode and battery thresholds. Operator
/// owned, long-lived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    pub meta: Meta,
    pub spec: RobotConfigSpec,
    #[serde(default)]
    pub status: RobotConfigStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfigSpec {
    #[serde(flatten)]
    pub scope: Scope,
    pub mode: RobotMode,
    #[serde(default)]
    pub chargers: Vec<String>,
    pub battery_min: f64,
    pub battery_ok: f64,
    pub battery_idle: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotConfigStatus {
    /// Current phase of the robot's order state machine
    #[serde(default)]
    pub statemachine: String,
    #[serde(default)]
    pub mission: String,
    #[serde(default)]
    pub order_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RobotMode {
    #[default]
    #[serde(rename = "run")]
    Run,
    #[serde(rename = "stop")]
    Stop,
}

impl Record for RobotConfig {
    const KIND: &'static str = "RobotConfig";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}

/// Continuously updated by the robot agent: transport availability and
/// battery level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotStatus {
    pub meta: Meta,
    #[serde(default)]
    pub status: RobotStatusData,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotStatusData {
    pub state: RobotState,
    #[serde(default)]
    pub battery_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RobotState {
    #[default]
    #[serde(rename = "UNDEFINED")]
    Undefined,
    #[serde(rename = "AVAILABLE")]
    Available,
    #[serde(rename = "UNAVAILABLE")]
    Unavailable,
    #[serde(rename = "ERROR")]
    Error,
}

impl Record for RobotStatus {
    const KIND: &'static str = "RobotStatus";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}
