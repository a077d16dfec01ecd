//! Path-guide management on the planner
//!
//! A path guide pins one (start, goal) pair on a map; creating one lets
//! the planner precompute the corresponding path. Guides created by this
//! estimator carry a name prefix so cleanup never touches guides an
//! operator drew by hand.

use crate::error::Error;
use crate::planner::{PathGuideItem, PathGuidePosType, PathGuidePosition, PlannerApi};
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Name prefix of path guides created (and cleaned up) by this component
pub const PATH_GUIDE_PREFIX: &str = "travel-time-estimator";

/// Position type ids valid as start or goal of a path guide
pub const GUIDE_POSITION_TYPES: [i64; 13] = [0, 1, 5, 8, 10, 12, 14, 15, 19, 21, 22, 23, 42];

/// Bidirectional name/identifier maps for the usable positions of one map
#[derive(Debug, Default)]
pub struct PositionIndex {
    pub pos_to_guid: HashMap<String, String>,
    pub guid_to_pos: HashMap<String, String>,
}

impl PositionIndex {
    pub fn guid_of(&self, position: &str) -> &str {
        self.pos_to_guid
            .get(position)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Build the position index for one map, keeping only positions usable
/// for path guides. Identifiers are unique; duplicate names keep the
/// first occurrence.
pub async fn position_index<P: PlannerApi>(
    planner: &P,
    map_id: &str,
) -> Result<PositionIndex, Error> {
    let mut index = PositionIndex::default();
    for position in planner.positions(map_id).await? {
        if !GUIDE_POSITION_TYPES.contains(&position.type_id) {
            continue;
        }
        index
            .guid_to_pos
            .insert(position.guid.clone(), position.name.clone());
        if index.pos_to_guid.contains_key(&position.name) {
            warn!(
                position = %position.name,
                "multiple positions share this name, continuing with the first"
            );
        } else {
            index.pos_to_guid.insert(position.name, position.guid);
        }
    }
    debug!(
        positions = index.guid_to_pos.len(),
        unique = index.pos_to_guid.len(),
        "indexed positions"
    );
    Ok(index)
}

/// Find an existing guide covering the given start and goal position
/// identifiers, optionally filtered by guide name first
async fn find_existing_guide<P: PlannerApi>(
    planner: &P,
    name: Option<&str>,
    start_guid: &str,
    goal_guid: &str,
) -> Result<Option<PathGuideItem>, Error> {
    for guide in planner.path_guides().await? {
        if let Some(name) = name
            && guide.name != name
        {
            continue;
        }
        let positions = match planner.path_guide_positions(&guide.guid).await {
            Ok(positions) => positions,
            Err(err) => {
                error!(%err, guide = %guide.guid, "error getting path guide positions");
                continue;
            }
        };
        let start_found = positions
            .iter()
            .any(|p| p.pos_type == PathGuidePosType::Start && p.pos_guid == start_guid);
        let goal_found = positions
            .iter()
            .any(|p| p.pos_type == PathGuidePosType::Goal && p.pos_guid == goal_guid);
        if start_found && goal_found {
            debug!(guide = %guide.name, "using existing path guide");
            return Ok(Some(guide));
        }
    }
    Ok(None)
}

/// Obtain a guide for the pair: an existing one, or a freshly created
/// temporary one when `create` is set. Returns `None` when no guide
/// exists and none may be created (the fleet controller owns them then).
pub async fn prepare_path_guide<P: PlannerApi>(
    planner: &P,
    map_id: &str,
    start: &str,
    goal: &str,
    index: &PositionIndex,
    create: bool,
    cleanup: bool,
) -> Result<Option<PathGuideItem>, Error> {
    let start_guid = index.guid_of(start).to_string();
    let goal_guid = index.guid_of(goal).to_string();
    let name = format!("{}-{}-{}", PATH_GUIDE_PREFIX, start, goal);

    if let Some(guide) = find_existing_guide(planner, Some(&name), &start_guid, &goal_guid).await? {
        return Ok(Some(guide));
    }
    debug!(start, goal, "path guide not found when searching by name");

    if create {
        // Create first, scan later: scanning every guide for identifiers
        // before each creation would take far too long
        let guide = planner.create_path_guide(map_id, &name).await?;

        let start_position = PathGuidePosition {
            path_guide_guid: guide.guid.clone(),
            pos_guid: start_guid.clone(),
            pos_type: PathGuidePosType::Start,
        };
        if let Err(err) = planner.add_path_guide_position(&start_position).await {
            if cleanup {
                delete_guide_best_effort(planner, &guide).await;
            }
            return Err(err);
        }

        let goal_position = PathGuidePosition {
            path_guide_guid: guide.guid.clone(),
            pos_guid: goal_guid.clone(),
            pos_type: PathGuidePosType::Goal,
        };
        match planner.add_path_guide_position(&goal_position).await {
            Ok(()) => {
                debug!(guide = %guide.name, "using new temporary path guide");
                return Ok(Some(guide));
            }
            Err(Error::PlannerDenied { .. }) => {
                // The planner rejects overlapping guides; one for these
                // positions exists under another name, search for it
                debug!(start, goal, "guide for these positions exists already, searching by identifiers");
                if cleanup {
                    delete_guide_best_effort(planner, &guide).await;
                }
            }
            Err(err) => {
                if cleanup {
                    delete_guide_best_effort(planner, &guide).await;
                }
                return Err(err);
            }
        }
    }

    let found = find_existing_guide(planner, None, &start_guid, &goal_guid).await?;
    if found.is_none() {
        debug!(start, goal, "path guide not found when searching by identifiers");
    }
    Ok(found)
}

async fn delete_guide_best_effort<P: PlannerApi>(planner: &P, guide: &PathGuideItem) {
    if let Err(err) = planner.delete_path_guide(&guide.guid).await {
        error!(%err, guide = %guide.guid, "error deleting unneeded path guide, continuing anyway");
    }
}
