//! Per-robot travel-time estimator
//!
//! Answers travel-time calculation requests by consulting the robot's
//! path-planner: cached paths are reused, missing ones are precomputed
//! through temporary path guides while the robot's move base is idle,
//! all bounded by the request deadline. Optionally precomputes extra
//! pairs opportunistically while the robot idles or charges, or runs
//! against a fleet controller instead of a single robot.

pub mod estimator;
pub mod guides;
pub mod movebase;

pub use estimator::TravelTimeEstimator;
pub use guides::{PATH_GUIDE_PREFIX, PositionIndex, position_index, prepare_path_guide};
pub use movebase::MoveBaseChecker;
