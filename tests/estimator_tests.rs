//! Integration tests for the travel-time estimator

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use warebid::config::FleetMode;
use warebid::error::Error;
use warebid::estimator::{MoveBaseChecker, TravelTimeEstimator};
use warebid::model::{
    Meta, PathKey, ROBOT_LABEL, TravelTimeCalculation, TravelTimeSpec, TravelTimeState,
};
use warebid::planner::{
    MapItem, MissionActionItem, PathDetail, PathGuideItem, PathGuidePosition, PathItem,
    PlannerApi, PlannerStatus, PositionItem, PrecalcResponse, pos_guid_to_path_pos,
};
use warebid::store::MemoryStore;

const ROBOT: &str = "robot-a";

/// Scripted planner: a fixed position set and a mutable path cache;
/// starting a precomputation inserts the guide's path into the cache
struct ScriptedPlanner {
    status: Mutex<PlannerStatus>,
    positions: Vec<PositionItem>,
    paths: Mutex<HashMap<String, (PathItem, PathDetail)>>,
    /// Guides created through the API, by guid
    guides: Mutex<Vec<PathGuideItem>>,
    guide_positions: Mutex<HashMap<String, Vec<PathGuidePosition>>>,
    /// When false, precalculation requests do not produce paths
    precalc_works: bool,
    guides_created: AtomicUsize,
    actions: Mutex<Vec<MissionActionItem>>,
}

impl ScriptedPlanner {
    fn new(position_names: &[(&str, i64)]) -> Self {
        let positions = position_names
            .iter()
            .enumerate()
            .map(|(i, (name, type_id))| PositionItem {
                guid: format!("pos-{}", i),
                name: name.to_string(),
                type_id: *type_id,
            })
            .collect();
        Self {
            status: Mutex::new(PlannerStatus {
                map_id: "map-1".to_string(),
                mission_queue_id: 0,
                state_id: 3,
                state_text: "Ready".to_string(),
                battery_percentage: 90.0,
            }),
            positions,
            paths: Mutex::new(HashMap::new()),
            guides: Mutex::new(Vec::new()),
            guide_positions: Mutex::new(HashMap::new()),
            precalc_works: true,
            guides_created: AtomicUsize::new(0),
            actions: Mutex::new(Vec::new()),
        }
    }

    fn guid_of(&self, name: &str) -> String {
        self.positions
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.guid.clone())
            .unwrap_or_default()
    }

    fn add_cached_path(&self, start: &str, goal: &str, valid: bool, time: f64) {
        let start_guid = self.guid_of(start);
        let goal_guid = self.guid_of(goal);
        let guid = format!("path-{}-{}", start_guid, goal_guid);
        self.paths.lock().insert(
            guid.clone(),
            (
                PathItem {
                    guid,
                    start_pos: pos_guid_to_path_pos(&start_guid),
                    goal_pos: pos_guid_to_path_pos(&goal_guid),
                },
                PathDetail { valid, time },
            ),
        );
    }
}

impl PlannerApi for ScriptedPlanner {
    async fn status(&self) -> Result<PlannerStatus, Error> {
        Ok(self.status.lock().clone())
    }

    async fn maps(&self) -> Result<Vec<MapItem>, Error> {
        Ok(vec![MapItem {
            guid: "map-1".to_string(),
            name: "warehouse".to_string(),
            url: String::new(),
        }])
    }

    async fn positions(&self, _map_id: &str) -> Result<Vec<PositionItem>, Error> {
        Ok(self.positions.clone())
    }

    async fn paths(&self, _map_id: &str) -> Result<Vec<PathItem>, Error> {
        Ok(self
            .paths
            .lock()
            .values()
            .map(|(item, _)| item.clone())
            .collect())
    }

    async fn path_detail(&self, path_guid: &str) -> Result<PathDetail, Error> {
        self.paths
            .lock()
            .get(path_guid)
            .map(|(_, detail)| detail.clone())
            .ok_or_else(|| Error::PlannerError(format!("unknown path {}", path_guid)))
    }

    async fn path_guides(&self) -> Result<Vec<PathGuideItem>, Error> {
        Ok(self.guides.lock().clone())
    }

    async fn create_path_guide(&self, _map_id: &str, name: &str) -> Result<PathGuideItem, Error> {
        self.guides_created.fetch_add(1, Ordering::SeqCst);
        let guide = PathGuideItem {
            guid: format!("guide-{}", name),
            name: name.to_string(),
        };
        self.guides.lock().push(guide.clone());
        Ok(guide)
    }

    async fn delete_path_guide(&self, guid: &str) -> Result<(), Error> {
        self.guides.lock().retain(|g| g.guid != guid);
        self.guide_positions.lock().remove(guid);
        Ok(())
    }

    async fn path_guide_positions(
        &self,
        guide_guid: &str,
    ) -> Result<Vec<PathGuidePosition>, Error> {
        Ok(self
            .guide_positions
            .lock()
            .get(guide_guid)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_path_guide_position(&self, position: &PathGuidePosition) -> Result<(), Error> {
        self.guide_positions
            .lock()
            .entry(position.path_guide_guid.clone())
            .or_default()
            .push(position.clone());
        Ok(())
    }

    async fn start_precalc(&self, guide_guid: &str) -> Result<PrecalcResponse, Error> {
        if self.precalc_works {
            // Resolve the pinned start/goal positions and put the path
            // into the cache, like the planner would after computing it
            let positions = self
                .guide_positions
                .lock()
                .get(guide_guid)
                .cloned()
                .unwrap_or_default();
            let start = positions
                .iter()
                .find(|p| p.pos_type == warebid::planner::PathGuidePosType::Start);
            let goal = positions
                .iter()
                .find(|p| p.pos_type == warebid::planner::PathGuidePosType::Goal);
            if let (Some(start), Some(goal)) = (start, goal) {
                let guid = format!("path-{}-{}", start.pos_guid, goal.pos_guid);
                self.paths.lock().insert(
                    guid.clone(),
                    (
                        PathItem {
                            guid,
                            start_pos: pos_guid_to_path_pos(&start.pos_guid),
                            goal_pos: pos_guid_to_path_pos(&goal.pos_guid),
                        },
                        PathDetail {
                            valid: true,
                            time: 33.0,
                        },
                    ),
                );
            }
        }
        Ok(PrecalcResponse {
            path_guide_guid: guide_guid.to_string(),
            total_count: 1,
            success_count: 1,
            fail_count: 0,
            message: String::new(),
        })
    }

    async fn mission_actions(&self, _id: i64) -> Result<Vec<MissionActionItem>, Error> {
        Ok(self.actions.lock().clone())
    }

    async fn mission_action(&self, _id: i64, action_id: i64) -> Result<MissionActionItem, Error> {
        self.actions
            .lock()
            .iter()
            .find(|a| a.id == action_id)
            .cloned()
            .ok_or_else(|| Error::PlannerError(format!("unknown action {}", action_id)))
    }
}

fn create_request(store: &MemoryStore, paths: Vec<PathKey>, deadline_secs: i64) {
    store
        .create(TravelTimeCalculation {
            meta: Meta::new("w1.100-robot-a").with_label(ROBOT_LABEL, ROBOT),
            spec: TravelTimeSpec {
                start_position: paths
                    .first()
                    .map(|p| p.start.clone())
                    .unwrap_or_default(),
                paths,
                valid_until: Utc::now() + ChronoDuration::seconds(deadline_secs),
            },
            status: Default::default(),
        })
        .unwrap();
}

async fn wait_for_processed(store: &MemoryStore, timeout: Duration) -> TravelTimeCalculation {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(request) = store.get::<TravelTimeCalculation>("w1.100-robot-a")
            && request.status.state == TravelTimeState::Processed
        {
            return request;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "travel-time request never processed"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn spawn_estimator(
    store: Arc<MemoryStore>,
    planner: ScriptedPlanner,
) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let estimator = Arc::new(TravelTimeEstimator::new(store, planner, ROBOT));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(estimator.run(shutdown_rx));
    (shutdown_tx, task)
}

#[tokio::test]
async fn cached_paths_answer_without_precomputation() {
    let store = MemoryStore::new();
    let planner = ScriptedPlanner::new(&[("BIN-01", 0), ("BIN-02", 5), ("STAGING", 7)]);
    planner.add_cached_path("BIN-01", "BIN-02", true, 12.5);

    let (shutdown_tx, task) = spawn_estimator(store.clone(), planner);
    create_request(&store, vec![PathKey::new("BIN-01", "BIN-02")], 60);

    let request = wait_for_processed(&store, Duration::from_secs(5)).await;
    assert_eq!(request.status.run_times.len(), 1);
    assert_eq!(request.status.run_times[0].start, "BIN-01");
    assert_eq!(request.status.run_times[0].goal, "BIN-02");
    assert_eq!(request.status.run_times[0].seconds, 12.5);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn same_start_and_goal_never_appears_in_results() {
    let store = MemoryStore::new();
    let planner = ScriptedPlanner::new(&[("BIN-01", 0), ("BIN-02", 0)]);
    planner.add_cached_path("BIN-01", "BIN-02", true, 9.0);

    let (shutdown_tx, task) = spawn_estimator(store.clone(), planner);
    create_request(
        &store,
        vec![
            PathKey::new("BIN-01", "BIN-01"),
            PathKey::new("BIN-01", "BIN-02"),
        ],
        60,
    );

    let request = wait_for_processed(&store, Duration::from_secs(5)).await;
    assert_eq!(request.status.run_times.len(), 1);
    assert!(
        request
            .status
            .run_times
            .iter()
            .all(|rt| rt.start != rt.goal)
    );

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn unknown_path_is_precomputed_through_a_guide() {
    let store = MemoryStore::new();
    let planner = ScriptedPlanner::new(&[("BIN-01", 0), ("BIN-02", 0)]);

    let (shutdown_tx, task) = spawn_estimator(store.clone(), planner);
    create_request(&store, vec![PathKey::new("BIN-01", "BIN-02")], 60);

    let request = wait_for_processed(&store, Duration::from_secs(10)).await;
    assert_eq!(request.status.run_times.len(), 1);
    assert_eq!(request.status.run_times[0].seconds, 33.0);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn deadline_expiry_yields_partial_results() {
    let store = MemoryStore::new();
    let mut planner = ScriptedPlanner::new(&[("BIN-01", 0), ("BIN-02", 0), ("BIN-03", 0)]);
    planner.precalc_works = false;
    planner.add_cached_path("BIN-01", "BIN-02", true, 7.0);

    let (shutdown_tx, task) = spawn_estimator(store.clone(), planner);
    // Deadline 12 s out: the estimator stops precomputing 10 s earlier
    create_request(
        &store,
        vec![
            PathKey::new("BIN-01", "BIN-02"),
            PathKey::new("BIN-01", "BIN-03"),
        ],
        12,
    );

    let request = wait_for_processed(&store, Duration::from_secs(15)).await;
    assert_eq!(request.status.run_times.len(), 1);
    assert_eq!(request.status.run_times[0].goal, "BIN-02");

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn positions_with_invalid_types_are_ignored() {
    let store = MemoryStore::new();
    // Type 7 cannot anchor a path guide; the pair must come back empty
    let planner = ScriptedPlanner::new(&[("BIN-01", 0), ("SHELF", 7)]);
    planner.add_cached_path("BIN-01", "BIN-01", true, 1.0);

    let (shutdown_tx, task) = spawn_estimator(store.clone(), planner);
    create_request(&store, vec![PathKey::new("BIN-01", "SHELF")], 12);

    let request = wait_for_processed(&store, Duration::from_secs(15)).await;
    assert!(request.status.run_times.is_empty());

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn fleet_mode_creates_guides_for_every_pair() {
    let store = MemoryStore::new();
    let planner = ScriptedPlanner::new(&[("BIN-01", 0), ("BIN-02", 0), ("BIN-03", 0)]);
    let guides_created = Arc::new(AtomicUsize::new(0));

    struct CountingPlanner {
        inner: ScriptedPlanner,
        count: Arc<AtomicUsize>,
    }

    impl PlannerApi for CountingPlanner {
        async fn status(&self) -> Result<PlannerStatus, Error> {
            self.inner.status().await
        }
        async fn maps(&self) -> Result<Vec<MapItem>, Error> {
            self.inner.maps().await
        }
        async fn positions(&self, map_id: &str) -> Result<Vec<PositionItem>, Error> {
            self.inner.positions(map_id).await
        }
        async fn paths(&self, map_id: &str) -> Result<Vec<PathItem>, Error> {
            self.inner.paths(map_id).await
        }
        async fn path_detail(&self, path_guid: &str) -> Result<PathDetail, Error> {
            self.inner.path_detail(path_guid).await
        }
        async fn path_guides(&self) -> Result<Vec<PathGuideItem>, Error> {
            self.inner.path_guides().await
        }
        async fn create_path_guide(
            &self,
            map_id: &str,
            name: &str,
        ) -> Result<PathGuideItem, Error> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.inner.create_path_guide(map_id, name).await
        }
        async fn delete_path_guide(&self, guid: &str) -> Result<(), Error> {
            self.inner.delete_path_guide(guid).await
        }
        async fn path_guide_positions(
            &self,
            guide_guid: &str,
        ) -> Result<Vec<PathGuidePosition>, Error> {
            self.inner.path_guide_positions(guide_guid).await
        }
        async fn add_path_guide_position(
            &self,
            position: &PathGuidePosition,
        ) -> Result<(), Error> {
            self.inner.add_path_guide_position(position).await
        }
        async fn start_precalc(&self, guide_guid: &str) -> Result<PrecalcResponse, Error> {
            self.inner.start_precalc(guide_guid).await
        }
        async fn mission_actions(&self, id: i64) -> Result<Vec<MissionActionItem>, Error> {
            self.inner.mission_actions(id).await
        }
        async fn mission_action(
            &self,
            id: i64,
            action_id: i64,
        ) -> Result<MissionActionItem, Error> {
            self.inner.mission_action(id, action_id).await
        }
    }

    let estimator = Arc::new(
        TravelTimeEstimator::new(
            store,
            CountingPlanner {
                inner: planner,
                count: guides_created.clone(),
            },
            "fleet",
        )
        .with_fleet_mode(FleetMode::Fleet),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(estimator.run(shutdown_rx));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while guides_created.load(Ordering::SeqCst) < 6 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "fleet pass never created all guides"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    // Three positions give six ordered pairs
    assert_eq!(guides_created.load(Ordering::SeqCst), 6);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn move_base_idle_rules() {
    // No mission queued: idle, and the cached mission context is cleared
    let planner = Arc::new(ScriptedPlanner::new(&[("BIN-01", 0)]));
    let checker = MoveBaseChecker::new(planner.clone());
    assert!(checker.is_idle().await);
    assert_eq!(checker.snapshot().mission_queue_id, 0);

    // Driving a mission: not idle
    {
        let mut status = planner.status.lock();
        status.mission_queue_id = 7;
        status.state_id = 5;
    }
    planner.actions.lock().push(MissionActionItem {
        id: 1,
        action_type: "move".to_string(),
        state: "Executing".to_string(),
    });
    assert!(!checker.is_idle().await);

    // Charging keeps the move base idle
    planner.actions.lock().push(MissionActionItem {
        id: 2,
        action_type: "charging".to_string(),
        state: "Executing".to_string(),
    });
    {
        let mut status = planner.status.lock();
        status.mission_queue_id = 8;
    }
    assert!(checker.is_idle().await);
    assert_eq!(checker.snapshot().action_type, "charging");

    // Mission gone again: idle and the cache resets
    {
        let mut status = planner.status.lock();
        status.mission_queue_id = 0;
    }
    assert!(checker.is_idle().await);
    assert_eq!(checker.snapshot().mission_queue_id, 0);
    assert!(checker.snapshot().action_type.is_empty());
}
