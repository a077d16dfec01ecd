//! Move-base idleness check
//!
//! Precomputation engages the robot's navigation stack, so it may only
//! run while the move base is idle: the robot is in an idle state, has no
//! running mission, or executes an action that does not move the base.

use crate::planner::PlannerApi;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error};

/// Robot states with an idle move base: idle, paused, docked, docking, error
pub const IDLE_STATE_IDS: [i64; 5] = [3, 4, 8, 9, 12];

/// Mission actions during which the move base is idle
pub const IDLE_ACTION_TYPES: [&str; 9] = [
    "charging",
    "docking",
    "pickup_cart",
    "place_cart",
    "pickup_shelf",
    "place_shelf",
    "wait_for_plc_register",
    "prompt_user",
    "wait",
];

const MAX_RESTARTS: u32 = 5;

#[derive(Debug, Clone, Default)]
pub struct MoveBaseSnapshot {
    pub map_id: String,
    pub mission_queue_id: i64,
    pub action_type: String,
}

#[derive(Default)]
struct Cached {
    mission_queue_id: i64,
    action_id: i64,
    action_type: String,
    map_id: String,
}

/// Checks whether the move base is currently idle, caching the mission
/// and action identifiers between polls to save planner round trips
pub struct MoveBaseChecker<P> {
    planner: Arc<P>,
    cached: Mutex<Cached>,
}

impl<P: PlannerApi> MoveBaseChecker<P> {
    pub fn new(planner: Arc<P>) -> Self {
        Self {
            planner,
            cached: Mutex::new(Cached::default()),
        }
    }

    /// Last observed map and mission context
    pub fn snapshot(&self) -> MoveBaseSnapshot {
        let cached = self.cached.lock();
        MoveBaseSnapshot {
            map_id: cached.map_id.clone(),
            mission_queue_id: cached.mission_queue_id,
            action_type: cached.action_type.clone(),
        }
    }

    fn reset_mission(&self) {
        let mut cached = self.cached.lock();
        cached.mission_queue_id = 0;
        cached.action_id = 0;
        cached.action_type.clear();
    }

    pub async fn is_idle(&self) -> bool {
        for _ in 0..MAX_RESTARTS {
            let status = match self.planner.status().await {
                Ok(status) => status,
                Err(err) => {
                    error!(%err, "error getting planner status");
                    return false;
                }
            };

            self.cached.lock().map_id = status.map_id.clone();

            // No running mission at all: the cached mission and action ids
            // must be cleared before reporting idle, a stale action would
            // otherwise be consulted on the next poll
            if status.mission_queue_id == 0 {
                debug!("no mission in queue, move base is idle");
                self.reset_mission();
                return true;
            }

            if IDLE_STATE_IDS.contains(&status.state_id) {
                debug!(state = %status.state_text, "robot state has idle move base");
                return true;
            }

            let stale = self.cached.lock().mission_queue_id != status.mission_queue_id;
            if stale {
                debug!("cached mission queue id is outdated, refreshing");
                {
                    let mut cached = self.cached.lock();
                    cached.mission_queue_id = status.mission_queue_id;
                    cached.action_id = 0;
                    cached.action_type.clear();
                }

                let actions = match self.planner.mission_actions(status.mission_queue_id).await {
                    Ok(actions) => actions,
                    Err(err) => {
                        error!(%err, mission_queue_id = status.mission_queue_id, "error getting mission actions");
                        self.reset_mission();
                        return false;
                    }
                };
                // Last action is the one currently executing
                let Some(last) = actions.last() else {
                    debug!("no actions in running mission, resetting");
                    self.reset_mission();
                    return false;
                };
                self.cached.lock().action_id = last.id;
            }

            let (mission_queue_id, action_id) = {
                let cached = self.cached.lock();
                (cached.mission_queue_id, cached.action_id)
            };
            let action = match self.planner.mission_action(mission_queue_id, action_id).await {
                Ok(action) => action,
                Err(err) => {
                    error!(%err, action_id, mission_queue_id, "error getting mission action");
                    self.reset_mission();
                    return false;
                }
            };

            self.cached.lock().action_type = action.action_type.clone();

            if action.state != "Executing" {
                debug!(
                    action_id,
                    state = %action.state,
                    "action is not executing anymore, starting over"
                );
                self.reset_mission();
                continue;
            }

            if IDLE_ACTION_TYPES.contains(&action.action_type.as_str()) {
                debug!(action_type = %action.action_type, "running action keeps move base idle");
                return true;
            }
            return false;
        }
        false
    }
}
