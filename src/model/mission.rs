//! High-level robot mission record, read-only to this system
//!
//! The action list is a polymorphic union on the wire: each element is an
//! object with exactly one discriminator key (`charge`,
//! `moveToNamedPosition`, `getTrolley`, `returnTrolley`). An externally
//! tagged enum decodes that shape directly.

use super::meta::Meta;
use crate::store::Record;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub meta: Meta,
    pub spec: MissionSpec,
    #[serde(default)]
    pub status: MissionStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MissionSpec {
    #[serde(default)]
    pub actions: Vec<MissionAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MissionAction {
    #[serde(rename = "charge")]
    Charge(ChargeTarget),
    #[serde(rename = "moveToNamedPosition")]
    MoveToNamedPosition(NamedTarget),
    #[serde(rename = "getTrolley")]
    GetTrolley(DockTarget),
    #[serde(rename = "returnTrolley")]
    ReturnTrolley(DockTarget),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeTarget {
    pub charger_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_battery_percent: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_battery_percent: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTarget {
    pub target_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockTarget {
    pub dock_name: String,
}

impl MissionAction {
    /// Position the robot ends up at after executing this action
    pub fn target(&self) -> &str {
        match self {
            MissionAction::Charge(c) => &c.charger_name,
            MissionAction::MoveToNamedPosition(t) => &t.target_name,
            MissionAction::GetTrolley(d) | MissionAction::ReturnTrolley(d) => &d.dock_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MissionStatus {
    pub state: MissionState,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissionState {
    #[default]
    #[serde(rename = "CREATED")]
    Created,
    #[serde(rename = "ACCEPTED")]
    Accepted,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "CANCELED")]
    Canceled,
    #[serde(rename = "FAILED")]
    Failed,
}

impl MissionState {
    /// States in which the mission's final action still predicts the
    /// robot's future position
    pub fn predicts_position(&self) -> bool {
        matches!(
            self,
            MissionState::Accepted | MissionState::Running | MissionState::Succeeded
        )
    }
}

impl Record for Mission {
    const KIND: &'static str = "Mission";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_union_decodes_on_discriminator_key() {
        let raw = r#"[
            {"charge": {"charger_name": "charger-1"}},
            {"moveToNamedPosition": {"target_name": "staging-2"}},
            {"getTrolley": {"dock_name": "dock-3"}},
            {"returnTrolley": {"dock_name": "dock-4"}}
        ]"#;
        let actions: Vec<MissionAction> = serde_json::from_str(raw).unwrap();
        let targets: Vec<&str> = actions.iter().map(|a| a.target()).collect();
        assert_eq!(targets, vec!["charger-1", "staging-2", "dock-3", "dock-4"]);
    }

    #[test]
    fn unknown_action_key_is_rejected() {
        let raw = r#"[{"teleport": {"target_name": "nowhere"}}]"#;
        let decoded: Result<Vec<MissionAction>, _> = serde_json::from_str(raw);
        assert!(decoded.is_err());
    }

    #[test]
    fn action_round_trips_through_json() {
        let action = MissionAction::Charge(ChargeTarget {
            charger_name: "charger-1".to_string(),
            threshold_battery_percent: Some(40),
            target_battery_percent: None,
        });
        let raw = serde_json::to_string(&action).unwrap();
        assert!(raw.starts_with(r#"{"charge""#));
        let back: MissionAction = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, action);
    }
}
