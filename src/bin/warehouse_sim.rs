//! In-process simulation of one auction round
//!
//! Wires the auctioneer, per-robot bid agents and per-robot travel-time
//! estimators against a single in-memory store, with a scripted order
//! manager and a synthetic path-planner. Usage:
//!
//! cargo run --bin warehouse-sim -- --robots 2 --orders 3

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use parking_lot::Mutex;
use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use warebid::admission::validate_auctioneer_config;
use warebid::auctioneer::{AuctioneerController, spawn_auctioneer_watches};
use warebid::bidagent::{BidAgentController, spawn_bid_agent_watches};
use warebid::error::Error;
use warebid::estimator::TravelTimeEstimator;
use warebid::model::{
    AuctionPolicy, AuctioneerConfig, Meta, OrderData, ROBOT_LABEL, Reservation, ReservationState,
    RobotConfig, RobotConfigSpec, RobotMode, RobotState, RobotStatus, Scope,
};
use warebid::planner::{
    MapItem, MissionActionItem, PathDetail, PathGuideItem, PathGuidePosition, PathItem,
    PlannerApi, PlannerStatus, PositionItem, pos_guid_to_path_pos,
};
use warebid::reconcile::Runner;
use warebid::store::{MemoryStore, StoreEvent};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of simulated robots
    #[arg(long, default_value_t = 2)]
    robots: usize,

    /// Number of warehouse orders the order manager offers per reservation
    #[arg(long, default_value_t = 3)]
    orders: usize,

    /// Log level directive, overridden by ZEROLOG_LOGLEVEL when set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<std::path::PathBuf>,
}

/// Scripted planner: every position pair has a cached path with a random
/// but stable travel time
struct ScriptedPlanner {
    positions: Vec<PositionItem>,
    paths: Mutex<HashMap<String, (PathItem, PathDetail)>>,
}

impl ScriptedPlanner {
    fn new(bins: &[String], seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let positions: Vec<PositionItem> = bins
            .iter()
            .enumerate()
            .map(|(i, name)| PositionItem {
                guid: format!("pos-{}", i),
                name: name.clone(),
                type_id: 0,
            })
            .collect();

        let mut paths = HashMap::new();
        for start in &positions {
            for goal in &positions {
                if start.guid == goal.guid {
                    continue;
                }
                let guid = format!("path-{}-{}", start.guid, goal.guid);
                let item = PathItem {
                    guid: guid.clone(),
                    start_pos: pos_guid_to_path_pos(&start.guid),
                    goal_pos: pos_guid_to_path_pos(&goal.guid),
                };
                let detail = PathDetail {
                    valid: true,
                    time: rng.random_range(5.0..120.0),
                };
                paths.insert(guid, (item, detail));
            }
        }
        Self {
            positions,
            paths: Mutex::new(paths),
        }
    }
}

impl PlannerApi for ScriptedPlanner {
    async fn status(&self) -> Result<PlannerStatus, Error> {
        Ok(PlannerStatus {
            map_id: "map-1".to_string(),
            mission_queue_id: 0,
            state_id: 3,
            state_text: "Ready".to_string(),
            battery_percentage: 90.0,
        })
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
        Ok(self.paths.lock().values().map(|(item, _)| item.clone()).collect())
    }

    async fn path_detail(&self, path_guid: &str) -> Result<PathDetail, Error> {
        self.paths
            .lock()
            .get(path_guid)
            .map(|(_, detail)| detail.clone())
            .ok_or_else(|| Error::PlannerError(format!("unknown path {}", path_guid)))
    }

    async fn path_guides(&self) -> Result<Vec<PathGuideItem>, Error> {
        Ok(Vec::new())
    }

    async fn create_path_guide(&self, _map_id: &str, name: &str) -> Result<PathGuideItem, Error> {
        Ok(PathGuideItem {
            guid: format!("guide-{}", name),
            name: name.to_string(),
        })
    }

    async fn delete_path_guide(&self, _guid: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn path_guide_positions(&self, _guid: &str) -> Result<Vec<PathGuidePosition>, Error> {
        Ok(Vec::new())
    }

    async fn add_path_guide_position(&self, _position: &PathGuidePosition) -> Result<(), Error> {
        Ok(())
    }

    async fn start_precalc(
        &self,
        guide_guid: &str,
    ) -> Result<warebid::planner::PrecalcResponse, Error> {
        Ok(warebid::planner::PrecalcResponse {
            path_guide_guid: guide_guid.to_string(),
            total_count: 1,
            success_count: 1,
            fail_count: 0,
            message: String::new(),
        })
    }

    async fn mission_actions(&self, _id: i64) -> Result<Vec<MissionActionItem>, Error> {
        Ok(Vec::new())
    }

    async fn mission_action(&self, _id: i64, _aid: i64) -> Result<MissionActionItem, Error> {
        Ok(MissionActionItem::default())
    }
}

/// Scripted order manager: fills new reservations with orders and marks
/// them succeeded once assignments arrive. The subscription is handed in
/// so it predates the first auctioneer pass.
async fn run_order_manager(
    store: Arc<MemoryStore>,
    orders: usize,
    bins: Vec<String>,
    mut events: tokio::sync::broadcast::Receiver<StoreEvent<Reservation>>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };
        let StoreEvent::Applied(reservation) = event else {
            continue;
        };

        if reservation.status.state == ReservationState::New {
            let Some(mut fresh) = store.get::<Reservation>(&reservation.meta.name) else {
                continue;
            };
            let count = orders.min(reservation.spec.request.quantity as usize);
            info!(reservation = %fresh.meta.name, count, "order manager fills reservation");
            fresh.status.warehouse_orders = (0..count)
                .map(|i| {
                    OrderData::new(
                        fresh.spec.request.scope.warehouse.clone(),
                        format!("order-{}", i + 1),
                    )
                    .with_task(
                        &format!("task-{}", i + 1),
                        &bins[i % bins.len()],
                        &bins[(i + 1) % bins.len()],
                    )
                })
                .collect();
            fresh.status.valid_until = Some(Utc::now() + ChronoDuration::seconds(45));
            fresh.status.state = ReservationState::Reservations;
            let _ = store.update(fresh);
        } else if !reservation.spec.assignments.is_empty()
            && reservation.status.state == ReservationState::Reservations
        {
            let Some(mut fresh) = store.get::<Reservation>(&reservation.meta.name) else {
                continue;
            };
            info!(
                reservation = %fresh.meta.name,
                assignments = ?fresh.spec.assignments,
                "order manager commits assignments"
            );
            fresh.status.assignments = fresh.spec.assignments.clone();
            fresh.status.state = ReservationState::Succeeded;
            let _ = store.update(fresh);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ZEROLOG_CONFIG / ZEROLOG_LOGLEVEL drive the log shape when present;
    // the CLI flags cover the common local run. The file guard must stay
    // alive for the process lifetime.
    let env_level = std::env::var("ZEROLOG_LOGLEVEL").ok();
    let level = env_level.as_deref().unwrap_or(&cli.log_level);
    let _log_guard = if let Some(path) = &cli.log_file {
        Some(
            warebid::logger::init_with_file(path, level)
                .map_err(|e| anyhow::anyhow!("init logging: {}", e))?,
        )
    } else if env_level.is_some() || std::env::var("ZEROLOG_CONFIG").is_ok() {
        warebid::logger::init_from_env().map_err(|e| anyhow::anyhow!("init logging: {}", e))?;
        None
    } else {
        warebid::logger::init(warebid::logger::LogFormat::Console, level)
            .map_err(|e| anyhow::anyhow!("init logging: {}", e))?;
        None
    };

    let store = MemoryStore::new();
    let scope = Scope::new("W1", "RB01", "RB-GROUP");
    let robots: Vec<String> = (0..cli.robots).map(|i| format!("robot-{}", i + 1)).collect();
    let bins: Vec<String> = (0..cli.orders + 1).map(|i| format!("BIN-{:02}", i)).collect();

    // Operator-side records
    let config = AuctioneerConfig::new(
        "auctioneer-w1",
        scope.clone(),
        AuctionPolicy {
            max_orders_per_robot: 2,
            min_orders_per_robot: 1,
            min_orders_per_auction: 1,
        },
    );
    validate_auctioneer_config(&config, &store.list::<AuctioneerConfig>())
        .map_err(|e| anyhow::anyhow!("admission rejected configuration: {}", e))?;
    store.create(config).map_err(|e| anyhow::anyhow!("{}", e))?;

    for robot in &robots {
        store
            .create(RobotConfig {
                meta: Meta::new(robot.clone()),
                spec: RobotConfigSpec {
                    scope: scope.clone(),
                    mode: RobotMode::Run,
                    chargers: vec!["charger-1".to_string()],
                    battery_min: 10.0,
                    battery_ok: 60.0,
                    battery_idle: 30.0,
                },
                status: Default::default(),
            })
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        let mut status = RobotStatus {
            meta: Meta::new(robot.clone()).with_label(ROBOT_LABEL, robot.clone()),
            status: Default::default(),
        };
        status.status.state = RobotState::Available;
        status.status.battery_percentage = 80.0;
        store.create(status).map_err(|e| anyhow::anyhow!("{}", e))?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut loops = Vec::new();

    // Scripted order manager, subscribed before the auctioneer starts
    let reservation_events = store.watch::<Reservation>();
    tokio::spawn(run_order_manager(
        store.clone(),
        cli.orders,
        bins.clone(),
        reservation_events,
    ));

    // Per-robot bid agents and estimators
    for (i, robot) in robots.iter().enumerate() {
        let bid_agent = Runner::new(BidAgentController::new(store.clone(), robot.clone()), 2);
        spawn_bid_agent_watches(store.clone(), bid_agent.handle(), robot.clone());
        loops.push(tokio::spawn(bid_agent.run(shutdown_rx.clone())));

        let estimator = Arc::new(TravelTimeEstimator::new(
            store.clone(),
            ScriptedPlanner::new(&bins, i as u64 + 1),
            robot.clone(),
        ));
        loops.push(tokio::spawn(estimator.run(shutdown_rx.clone())));
    }

    // Auctioneer loop, kicked off last
    let auctioneer = Runner::new(
        AuctioneerController::new(store.clone(), robots.iter().cloned()),
        4,
    );
    let handle = auctioneer.handle();
    spawn_auctioneer_watches(store.clone(), handle.clone(), robots.iter().cloned().collect());
    handle.enqueue("auctioneer-w1");
    loops.push(tokio::spawn(auctioneer.run(shutdown_rx.clone())));

    // Wait for the round to finish or the operator to interrupt
    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        result = wait_for_assignments(store.clone()) => Some(result),
    };

    if let Some(assignments) = outcome {
        println!("auction round finished:");
        for assignment in assignments {
            println!(
                "  order {} -> robot {}",
                assignment.order_id, assignment.robot
            );
        }
    }

    shutdown_tx.send(true)?;
    for task in loops {
        let _ = task.await;
    }
    Ok(())
}

async fn wait_for_assignments(store: Arc<MemoryStore>) -> Vec<warebid::model::OrderAssignment> {
    loop {
        for reservation in store.list::<Reservation>() {
            if reservation.status.state == ReservationState::Succeeded {
                return reservation.status.assignments;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
