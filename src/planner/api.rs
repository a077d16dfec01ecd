//! Wire types of the path-planner HTTP API, version 2.0.0

use serde::{Deserialize, Serialize};

/// Prefix used by the paths endpoint to reference positions
const PATH_POS_PREFIX: &str = "/v2.0.0/positions/";

/// `GET /status`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerStatus {
    pub map_id: String,
    #[serde(default)]
    pub mission_queue_id: i64,
    #[serde(default)]
    pub state_id: i64,
    #[serde(default)]
    pub state_text: String,
    #[serde(default)]
    pub battery_percentage: f64,
}

/// `GET /maps` item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapItem {
    pub guid: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
}

/// `GET /maps/{id}/positions` item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionItem {
    pub guid: String,
    pub name: String,
    pub type_id: i64,
}

/// `GET /maps/{id}/paths` item; start/goal are prefixed position strings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathItem {
    pub guid: String,
    pub start_pos: String,
    pub goal_pos: String,
}

/// `GET /paths/{guid}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathDetail {
    pub valid: bool,
    #[serde(default)]
    pub time: f64,
}

/// `GET /path_guides` item and `POST /path_guides` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathGuideItem {
    pub guid: String,
    pub name: String,
}

/// `POST /path_guides` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePathGuide {
    pub map_id: String,
    pub name: String,
}

/// `GET /path_guides/{guid}/positions` item and POST body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathGuidePosition {
    pub path_guide_guid: String,
    pub pos_guid: String,
    pub pos_type: PathGuidePosType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathGuidePosType {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "goal")]
    Goal,
}

/// `POST /path_guides_precalc` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecalcCommand {
    pub command: String,
    pub guid: String,
}

impl PrecalcCommand {
    pub fn start(guid: impl Into<String>) -> Self {
        Self {
            command: "start".to_string(),
            guid: guid.into(),
        }
    }
}

/// `POST /path_guides_precalc` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrecalcResponse {
    #[serde(default)]
    pub path_guide_guid: String,
    #[serde(default)]
    pub total_count: i64,
    #[serde(default)]
    pub success_count: i64,
    #[serde(default)]
    pub fail_count: i64,
    #[serde(default)]
    pub message: String,
}

/// `GET /mission_queue/{id}/actions` item; the last element is the
/// currently executing action
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissionActionItem {
    pub id: i64,
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub state: String,
}

/// Error body of any endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub error_human: String,
}

/// Convert a position identifier into the prefixed string the paths
/// endpoint uses for `start_pos` / `goal_pos`
pub fn pos_guid_to_path_pos(pos_guid: &str) -> String {
    format!("{}{}", PATH_POS_PREFIX, pos_guid)
}

/// Reverse of [`pos_guid_to_path_pos`]
pub fn path_pos_to_pos_guid(path_pos: &str) -> &str {
    path_pos.strip_prefix(PATH_POS_PREFIX).unwrap_or(path_pos)
}
