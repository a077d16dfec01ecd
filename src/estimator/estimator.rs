//! Travel-time estimation against the path-planner

use super::guides::{PATH_GUIDE_PREFIX, PositionIndex, position_index, prepare_path_guide};
use super::movebase::MoveBaseChecker;
use crate::config::FleetMode;
use crate::error::Error;
use crate::model::{PathKey, RunTime, TravelTimeCalculation, TravelTimeState};
use crate::planner::{PlannerApi, pos_guid_to_path_pos, path_pos_to_pos_guid};
use crate::store::{MemoryStore, StoreEvent};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Travel-time requests stop precomputing this long before their deadline
const RESULT_BUFFER: chrono::Duration = chrono::Duration::seconds(10);

const IDLE_POLL: Duration = Duration::from_millis(500);
const PATH_POLL: Duration = Duration::from_secs(1);

/// Requeue intervals of the opportunistic precomputation scheduler
const FLEET_REQUEUE: Duration = Duration::from_secs(30);
const QUEUE_REFILL_REQUEUE: Duration = Duration::from_secs(120);
const BUSY_REQUEUE: Duration = Duration::from_secs(10);
const NEXT_PAIR_REQUEUE: Duration = Duration::from_millis(500);

/// Budget for one opportunistic precomputation
const IDLE_PRECALC_BUDGET: chrono::Duration = chrono::Duration::minutes(5);

/// Resident estimator for one robot (or one fleet controller)
pub struct TravelTimeEstimator<P: PlannerApi> {
    robot_name: String,
    store: Arc<MemoryStore>,
    planner: Arc<P>,
    move_base: MoveBaseChecker<P>,
    fleet_mode: FleetMode,
    precalc_paths_when_idle: bool,
    preserve_path_guides: bool,
    /// Known-unknown pairs awaiting opportunistic precomputation; lost on
    /// restart and rebuilt from the active map
    path_queue: Mutex<HashSet<PathKey>>,
}

impl<P: PlannerApi> TravelTimeEstimator<P> {
    pub fn new(store: Arc<MemoryStore>, planner: P, robot_name: impl Into<String>) -> Self {
        let planner = Arc::new(planner);
        Self {
            robot_name: robot_name.into(),
            store,
            move_base: MoveBaseChecker::new(planner.clone()),
            planner,
            fleet_mode: FleetMode::None,
            precalc_paths_when_idle: false,
            preserve_path_guides: false,
            path_queue: Mutex::new(HashSet::new()),
        }
    }

    /// Select fleet-controller behaviour
    pub fn with_fleet_mode(mut self, mode: FleetMode) -> Self {
        self.fleet_mode = mode;
        self
    }

    /// Precompute queued paths while the robot is charging or idle
    pub fn with_precalc_paths_when_idle(mut self, enabled: bool) -> Self {
        self.precalc_paths_when_idle = enabled;
        self
    }

    /// Keep created path guides for debugging instead of cleaning them up
    pub fn with_preserve_path_guides(mut self, preserve: bool) -> Self {
        self.preserve_path_guides = preserve;
        self
    }

    /// Main loop: answers incoming travel-time requests for this robot
    /// and interleaves opportunistic precomputation ticks
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(robot = %self.robot_name, "starting travel-time estimator");

        let mut events = self.store.watch::<TravelTimeCalculation>();

        // Catch up on requests that arrived before this estimator started;
        // subscribing first closes the gap
        let pending = self.store.list_filtered(|r: &TravelTimeCalculation| {
            r.meta.robot() == self.robot_name && r.status.state == TravelTimeState::Pending
        });
        for request in pending {
            self.process_request(request).await;
        }

        let (tick_tx, mut tick_rx) = mpsc::unbounded_channel::<()>();
        if self.precalc_paths_when_idle {
            info!("path precomputation while charging or idle is enabled");
            let _ = tick_tx.send(());
        } else if self.fleet_mode == FleetMode::Fleet {
            info!("path-guide precomputation on the fleet controller is enabled");
            let _ = tick_tx.send(());
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(StoreEvent::Applied(request)) => {
                        if request.meta.robot() == self.robot_name
                            && request.status.state == TravelTimeState::Pending
                        {
                            self.process_request(request).await;
                        }
                    }
                    Ok(StoreEvent::Deleted(_)) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                Some(()) = tick_rx.recv() => {
                    self.clone().precalc_pass(&tick_tx).await;
                }
            }
        }
        info!(robot = %self.robot_name, "travel-time estimator stopped");
    }

    async fn process_request(&self, mut request: TravelTimeCalculation) {
        info!(request = %request.meta.name, "starting travel time calculation");

        request.status.state = TravelTimeState::Running;
        request = match self.store.update(request) {
            Ok(updated) => updated,
            Err(err) => {
                error!(%err, "error marking travel-time request running");
                return;
            }
        };

        let map_id = match self.planner.status().await {
            Ok(status) => status.map_id,
            Err(err) => {
                error!(%err, robot = %self.robot_name, "error getting planner status");
                return;
            }
        };
        let index = match position_index(self.planner.as_ref(), &map_id).await {
            Ok(index) => index,
            Err(err) => {
                error!(%err, robot = %self.robot_name, "error getting positions of active map");
                return;
            }
        };

        // Pairs with equal start and goal can never be computed
        let mut requested: Vec<PathKey> = Vec::new();
        for path in &request.spec.paths {
            if path.start == path.goal {
                info!(%path, "start and goal are equal, not looking for this path");
            } else if !requested.contains(path) {
                requested.push(path.clone());
            }
        }

        let (mut known, unknown) = match self.collect_paths(&map_id, &index, requested).await {
            Ok(collected) => collected,
            Err(err) => {
                error!(%err, robot = %self.robot_name, "error collecting paths of active map");
                return;
            }
        };

        if !unknown.is_empty() {
            // Precomputation can take a while; publish what is already
            // known so the bid agent can act on partial data
            request = self.write_result(request, &known, TravelTimeState::Running);

            let stop_at = request.spec.valid_until - RESULT_BUFFER;
            self.precalculate_paths(&map_id, &index, &unknown, stop_at)
                .await;

            match self
                .collect_paths(&map_id, &index, unknown.into_iter().collect())
                .await
            {
                Ok((found, still_unknown)) => {
                    known.extend(found);
                    if !still_unknown.is_empty() {
                        debug!(count = still_unknown.len(), "paths remain unknown past deadline");
                    }
                }
                Err(err) => {
                    error!(%err, robot = %self.robot_name, "error collecting precomputed paths");
                }
            }
        }

        self.write_result(request, &known, TravelTimeState::Processed);
        info!("finished travel time calculation");
    }

    /// Look the requested pairs up in the planner's path cache. Valid
    /// cached paths move into the result; invalid ones stay requested and
    /// are recomputed.
    async fn collect_paths(
        &self,
        map_id: &str,
        index: &PositionIndex,
        requested: Vec<PathKey>,
    ) -> Result<(HashMap<PathKey, f64>, HashSet<PathKey>), Error> {
        let mut known: HashMap<PathKey, f64> = HashMap::new();
        let mut remaining: HashSet<PathKey> = requested.into_iter().collect();

        for item in self.planner.paths(map_id).await? {
            let start = index.guid_to_pos.get(path_pos_to_pos_guid(&item.start_pos));
            let goal = index.guid_to_pos.get(path_pos_to_pos_guid(&item.goal_pos));
            let (Some(start), Some(goal)) = (start, goal) else {
                continue;
            };
            let key = PathKey::new(start.clone(), goal.clone());
            if !remaining.contains(&key) {
                continue;
            }
            match self.planner.path_detail(&item.guid).await {
                Ok(detail) if detail.valid => {
                    debug!(path = %key, "path found in cache");
                    remaining.remove(&key);
                    // Already computed, no need to precompute it while
                    // charging or idling either
                    self.path_queue.lock().remove(&key);
                    known.insert(key, detail.time);
                }
                Ok(_) => {
                    warn!(path = %key, "path found but invalid, trying to recompute it");
                }
                Err(err) => {
                    error!(%err, path_guid = %item.guid, "error getting path detail");
                }
            }
        }

        info!(
            known = known.len(),
            unknown = remaining.len(),
            "looked up requested paths in the planner cache"
        );
        Ok((known, remaining))
    }

    /// Write run times for all known requested paths onto the record.
    /// Returns the stored copy so follow-up writes carry a fresh
    /// generation.
    fn write_result(
        &self,
        mut request: TravelTimeCalculation,
        known: &HashMap<PathKey, f64>,
        state: TravelTimeState,
    ) -> TravelTimeCalculation {
        let mut run_times: Vec<RunTime> = Vec::new();
        for path in &request.spec.paths {
            if let Some(&seconds) = known.get(path) {
                run_times.push(RunTime {
                    start: path.start.clone(),
                    goal: path.goal.clone(),
                    seconds,
                });
            }
        }
        info!(
            results = run_times.len(),
            requested = request.spec.paths.len(),
            "writing travel time results"
        );
        request.status.run_times = run_times;
        request.status.state = state;
        match self.store.update(request.clone()) {
            Ok(updated) => updated,
            Err(err) => {
                error!(%err, request = %request.meta.name, "error updating travel-time result");
                request
            }
        }
    }

    /// Precompute the given pairs one by one, each waiting for an idle
    /// move base and all bounded by the stop time
    async fn precalculate_paths(
        &self,
        map_id: &str,
        index: &PositionIndex,
        unknown: &HashSet<PathKey>,
        stop_at: DateTime<Utc>,
    ) {
        info!(count = unknown.len(), "start creating path guides for unknown paths");
        for path in unknown {
            if path.start == path.goal {
                info!(%path, "skipping path, start and goal positions are equal");
                continue;
            }
            info!(%path, "precomputing path");

            if !self.move_base.is_idle().await {
                info!("waiting until the robot is able to precompute paths");
                while Utc::now() < stop_at {
                    if self.move_base.is_idle().await {
                        info!(robot = %self.robot_name, "move base is idle, starting precomputation");
                        break;
                    }
                    tokio::time::sleep(IDLE_POLL).await;
                }
            }
            if Utc::now() >= stop_at {
                info!("running out of time, precomputation stopped");
                break;
            }

            let create = self.fleet_mode != FleetMode::FleetRobot;
            let cleanup = !self.preserve_path_guides;
            let guide = match prepare_path_guide(
                self.planner.as_ref(),
                map_id,
                &path.start,
                &path.goal,
                index,
                create,
                cleanup,
            )
            .await
            {
                Ok(Some(guide)) => guide,
                Ok(None) => {
                    if self.fleet_mode == FleetMode::FleetRobot {
                        warn!(%path, "path guide not found, waiting for the fleet controller to create it");
                    } else {
                        error!(%path, "path guide not found");
                    }
                    continue;
                }
                Err(err) => {
                    error!(%err, "error creating path guide");
                    continue;
                }
            };

            match self.planner.start_precalc(&guide.guid).await {
                Err(err) => {
                    error!(%err, "error starting precomputation of path guide");
                    self.path_queue.lock().remove(path);
                }
                Ok(precalc) => {
                    if precalc.path_guide_guid.is_empty() {
                        error!(message = %precalc.message, "precomputation not started");
                        self.path_queue.lock().remove(path);
                        continue;
                    }
                    if precalc.path_guide_guid != guide.guid {
                        info!("precomputation not started, a different one is in process");
                        continue;
                    }
                    info!(
                        total = precalc.total_count,
                        succeeded = precalc.success_count,
                        failed = precalc.fail_count,
                        "precomputation of path guide started"
                    );

                    // The precalc endpoint gives no useful answer while
                    // the robot moves, so poll the path cache instead
                    loop {
                        if self
                            .check_path_created(map_id, index.guid_of(&path.start), index.guid_of(&path.goal))
                            .await
                        {
                            info!(%path, "precomputation finished, path found");
                            break;
                        }
                        if Utc::now() >= stop_at {
                            info!(%path, "running out of time, cannot wait for precomputation result");
                            break;
                        }
                        tokio::time::sleep(PATH_POLL).await;
                    }
                    self.path_queue.lock().remove(path);

                    if self.fleet_mode != FleetMode::FleetRobot
                        && !self.preserve_path_guides
                        && guide.name.starts_with(PATH_GUIDE_PREFIX)
                    {
                        match self.planner.delete_path_guide(&guide.guid).await {
                            Ok(()) => info!(guide = %guide.guid, "cleaned up path guide"),
                            Err(err) => {
                                error!(%err, "error cleaning up path guide, continuing anyway");
                            }
                        }
                    }
                }
            }
        }
    }

    async fn check_path_created(&self, map_id: &str, start_guid: &str, goal_guid: &str) -> bool {
        let paths = match self.planner.paths(map_id).await {
            Ok(paths) => paths,
            Err(err) => {
                error!(%err, "error getting paths of map");
                return false;
            }
        };
        for item in paths {
            if item.start_pos == pos_guid_to_path_pos(start_guid)
                && item.goal_pos == pos_guid_to_path_pos(goal_guid)
            {
                match self.planner.path_detail(&item.guid).await {
                    Ok(detail) => {
                        // Very short paths are often flagged invalid by
                        // the planner; they are used anyway and
                        // recomputed next time
                        if detail.valid {
                            debug!("path found");
                        } else {
                            warn!("path found but invalid, using it anyway");
                        }
                        return true;
                    }
                    Err(err) => {
                        error!(%err, path_guid = %item.guid, "error getting path detail");
                        continue;
                    }
                }
            }
        }
        false
    }

    /// One opportunistic precomputation step; reschedules itself through
    /// the tick channel
    async fn precalc_pass(self: Arc<Self>, tick_tx: &mpsc::UnboundedSender<()>) {
        if self.fleet_mode == FleetMode::Fleet {
            self.fleet_pass().await;
            self.requeue(tick_tx, FLEET_REQUEUE);
            return;
        }

        if self.path_queue.lock().is_empty() {
            // Rebuild the queue in the background from the active map
            info!("no queue for idle-time precomputation, creating it in the background");
            let estimator = self.clone();
            let tick_tx = tick_tx.clone();
            tokio::spawn(async move {
                estimator.refill_queue().await;
                estimator.requeue(&tick_tx, QUEUE_REFILL_REQUEUE);
            });
            return;
        }

        if !self.move_base.is_idle().await {
            self.requeue(tick_tx, BUSY_REQUEUE);
            return;
        }
        let snapshot = self.move_base.snapshot();
        // Besides an idle move base the robot must be charging or have no
        // mission at all before background work may engage the planner
        if snapshot.action_type != "charging" && snapshot.mission_queue_id != 0 {
            self.requeue(tick_tx, BUSY_REQUEUE);
            return;
        }

        if snapshot.action_type == "charging" {
            info!("robot is charging, precomputing queued paths meanwhile");
        } else {
            info!("robot is idling, precomputing queued paths meanwhile");
        }

        let index = match position_index(self.planner.as_ref(), &snapshot.map_id).await {
            Ok(index) => index,
            Err(err) => {
                error!(%err, "error getting positions of active map");
                self.requeue(tick_tx, NEXT_PAIR_REQUEUE);
                return;
            }
        };

        // One pair per tick; the scheduler comes right back for the next
        let next = self.path_queue.lock().iter().next().cloned();
        if let Some(path) = next {
            let single: HashSet<PathKey> = HashSet::from([path]);
            self.precalculate_paths(
                &snapshot.map_id,
                &index,
                &single,
                Utc::now() + IDLE_PRECALC_BUDGET,
            )
            .await;
        }
        info!(
            remaining = self.path_queue.lock().len(),
            "paths still queued for precomputation"
        );
        self.requeue(tick_tx, NEXT_PAIR_REQUEUE);
    }

    /// Fleet mode: create guides for every pair on every map and let the
    /// fleet controller do the precomputation. No idle check, no cleanup.
    async fn fleet_pass(&self) {
        let maps = match self.planner.maps().await {
            Ok(maps) => maps,
            Err(err) => {
                error!(%err, "error getting maps from fleet controller");
                return;
            }
        };
        for map in maps {
            let index = match position_index(self.planner.as_ref(), &map.guid).await {
                Ok(index) => index,
                Err(err) => {
                    error!(%err, map = %map.name, "error getting positions of map");
                    return;
                }
            };
            info!(map = %map.name, "creating path guides");
            for start in index.pos_to_guid.keys() {
                for goal in index.pos_to_guid.keys() {
                    if start == goal {
                        continue;
                    }
                    if let Err(err) = prepare_path_guide(
                        self.planner.as_ref(),
                        &map.guid,
                        start,
                        goal,
                        &index,
                        true,
                        false,
                    )
                    .await
                    {
                        error!(%err, start, goal, "error creating path guide");
                    }
                }
            }
            info!(map = %map.name, "creating path guides finished");
        }
    }

    /// Enumerate all position pairs of the active map and queue the ones
    /// the path cache does not cover yet
    async fn refill_queue(&self) {
        let map_id = match self.planner.status().await {
            Ok(status) => status.map_id,
            Err(err) => {
                error!(%err, robot = %self.robot_name, "error getting planner status");
                return;
            }
        };
        let index = match position_index(self.planner.as_ref(), &map_id).await {
            Ok(index) => index,
            Err(err) => {
                error!(%err, "error getting positions of active map");
                return;
            }
        };

        let mut pairs: Vec<PathKey> = Vec::new();
        for start in index.pos_to_guid.keys() {
            for goal in index.pos_to_guid.keys() {
                if start != goal {
                    pairs.push(PathKey::new(start.clone(), goal.clone()));
                }
            }
        }

        match self.collect_paths(&map_id, &index, pairs).await {
            Ok((_, unknown)) => {
                let count = unknown.len();
                *self.path_queue.lock() = unknown;
                info!(
                    count,
                    robot = %self.robot_name,
                    "queue for idle-time precomputation created"
                );
            }
            Err(err) => {
                error!(%err, "error collecting paths of active map");
            }
        }
    }

    fn requeue(&self, tick_tx: &mpsc::UnboundedSender<()>, delay: Duration) {
        let tick_tx = tick_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tick_tx.send(());
        });
    }
}
