//! Path-planner HTTP interface
//!
//! The travel-time estimator is the only component talking to the
//! planner. It does so through [`PlannerApi`] so that the estimator logic
//! can be exercised against a scripted planner in tests; [`Client`] is
//! the production implementation speaking the v2.0.0 JSON API.

pub mod api;
pub mod http;

pub use api::*;
pub use http::Client;

use crate::error::Error;
use std::future::Future;

/// The slice of the planner API the estimator needs
pub trait PlannerApi: Send + Sync + 'static {
    fn status(&self) -> impl Future<Output = Result<PlannerStatus, Error>> + Send;

    fn maps(&self) -> impl Future<Output = Result<Vec<MapItem>, Error>> + Send;

    fn positions(
        &self,
        map_id: &str,
    ) -> impl Future<Output = Result<Vec<PositionItem>, Error>> + Send;

    fn paths(&self, map_id: &str) -> impl Future<Output = Result<Vec<PathItem>, Error>> + Send;

    fn path_detail(
        &self,
        path_guid: &str,
    ) -> impl Future<Output = Result<PathDetail, Error>> + Send;

    fn path_guides(&self) -> impl Future<Output = Result<Vec<PathGuideItem>, Error>> + Send;

    fn create_path_guide(
        &self,
        map_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<PathGuideItem, Error>> + Send;

    fn delete_path_guide(&self, guid: &str) -> impl Future<Output = Result<(), Error>> + Send;

    fn path_guide_positions(
        &self,
        guide_guid: &str,
    ) -> impl Future<Output = Result<Vec<PathGuidePosition>, Error>> + Send;

    fn add_path_guide_position(
        &self,
        position: &PathGuidePosition,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn start_precalc(
        &self,
        guide_guid: &str,
    ) -> impl Future<Output = Result<PrecalcResponse, Error>> + Send;

    fn mission_actions(
        &self,
        mission_queue_id: i64,
    ) -> impl Future<Output = Result<Vec<MissionActionItem>, Error>> + Send;

    fn mission_action(
        &self,
        mission_queue_id: i64,
        action_id: i64,
    ) -> impl Future<Output = Result<MissionActionItem, Error>> + Send;
}
