//! Reconcile controller for the auctioneer

use super::winners::select_winners;
use super::{BELOW_MIN_REQUEUE, CLOSE_BUFFER, MAX_COMPLETED_RESERVATIONS, ORDERS_PER_NEEDY_ROBOT};
use crate::error::Error;
use crate::model::{
    AUCTION_LABEL, Auction, AuctionSpec, AuctionState, AuctioneerConfig, AuctioneerState,
    AuctioneerStatus, BLOCKED_PHASES, BidState, CHARGING_PHASE, Meta, OrderRequest, OrderStatus,
    ROBOT_LABEL, Reservation, ReservationSpec, ReservationState, RobotConfig, RobotMode,
    RobotState, RobotStatus, WarehouseOrder,
};
use crate::reconcile::{ReconcileStatus, Reconciler};
use crate::store::{MemoryStore, Record};
use crate::utils::max_int;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Number of running warehouse orders / non-completed auctions per robot
type CountPerRobot = HashMap<String, i64>;

/// All auction records of one auction round, keyed by the auction-id label
type AuctionMap = HashMap<String, Vec<Auction>>;

/// Robots of one scope, split into in-scope and currently-available sets
#[derive(Debug, Default)]
pub struct RobotStates {
    pub in_scope: BTreeSet<String>,
    pub available: BTreeSet<String>,
}

/// Reservations classified into the categories deciding what happens next
#[derive(Debug, Default)]
struct ClassifiedReservations {
    auctions_to_create: Vec<Reservation>,
    auctions_to_close: Vec<Reservation>,
    auctions_to_complete: Vec<Reservation>,
    auctions_running: Vec<Reservation>,
    wait_for_order_manager: Vec<Reservation>,
}

/// Level-triggered reconciler for one or more auctioneer configurations
pub struct AuctioneerController {
    store: Arc<MemoryStore>,
    deployed_robots: HashSet<String>,
}

impl AuctioneerController {
    pub fn new(store: Arc<MemoryStore>, deployed_robots: impl IntoIterator<Item = String>) -> Self {
        Self {
            store,
            deployed_robots: deployed_robots.into_iter().collect(),
        }
    }

    /// Classify the robots of this auctioneer's scope.
    ///
    /// A robot is in scope iff its configuration matches the scope exactly
    /// and the operator deployed the bid agent on it. It is available iff
    /// it is in scope, in run mode, reports the available state, its state
    /// machine is not in a blocked phase, and it is either not charging or
    /// still above its idle battery threshold.
    pub fn get_robots(&self, config: &AuctioneerConfig) -> RobotStates {
        let mut states = RobotStates::default();

        let mut status_available: HashMap<String, bool> = HashMap::new();
        let mut battery: HashMap<String, f64> = HashMap::new();
        for rs in self.store.list::<RobotStatus>() {
            let name = rs.meta.name.clone();
            battery.insert(name.clone(), rs.status.battery_percentage);
            if self.deployed_robots.contains(&name) && rs.status.state == RobotState::Available {
                status_available.insert(name, true);
            }
        }

        for rc in self.store.list::<RobotConfig>() {
            let name = &rc.meta.name;
            if !self.deployed_robots.contains(name) || rc.spec.scope != config.spec.scope {
                continue;
            }
            debug!(robot = %name, auctioneer = %config.meta.name, "robot is in scope");
            states.in_scope.insert(name.clone());

            let phase = rc.status.statemachine.as_str();
            let blocked = BLOCKED_PHASES.contains(&phase);
            let drained = phase == CHARGING_PHASE
                && battery.get(name).copied().unwrap_or(0.0) <= rc.spec.battery_idle;
            if rc.spec.mode == RobotMode::Run
                && status_available.get(name).copied().unwrap_or(false)
                && !blocked
                && !drained
            {
                debug!(robot = %name, "robot is available");
                states.available.insert(name.clone());
            }
        }

        states
    }

    /// Running warehouse orders per robot in scope
    fn map_warehouse_orders(&self, robots: &RobotStates) -> CountPerRobot {
        let mut orders_per_robot = CountPerRobot::new();
        for order in self.store.list::<WarehouseOrder>() {
            let robot = order.meta.robot();
            if robots.in_scope.contains(robot) && order.spec.order_status == OrderStatus::Running {
                *orders_per_robot.entry(robot.to_string()).or_insert(0) += 1;
            }
        }
        debug!(?orders_per_robot, "running warehouse orders per robot");
        orders_per_robot
    }

    /// Auction children per round plus non-completed auction count per robot
    fn map_auctions(&self, reservations: &[Reservation]) -> (AuctionMap, CountPerRobot) {
        let mut auction_map = AuctionMap::new();
        let mut auctions_per_robot = CountPerRobot::new();
        for res in reservations {
            for auction in self.store.list_owned_by::<Auction>(res.meta.uid) {
                if auction.spec.auction_state != AuctionState::Completed {
                    *auctions_per_robot
                        .entry(auction.meta.robot().to_string())
                        .or_insert(0) += 1;
                }
                auction_map
                    .entry(auction.meta.auction_id().to_string())
                    .or_default()
                    .push(auction);
            }
        }
        debug!(?auctions_per_robot, "running auctions per robot");
        (auction_map, auctions_per_robot)
    }

    fn classify_reservations(
        &self,
        reservations: Vec<Reservation>,
        auction_map: &AuctionMap,
        robots: &RobotStates,
    ) -> ClassifiedReservations {
        let mut classified = ClassifiedReservations::default();
        let now = Utc::now();
        for res in reservations {
            match res.status.state {
                ReservationState::Reservations => {
                    let children = auction_map.get(res.meta.auction_id());
                    match children {
                        None => classified.auctions_to_create.push(res),
                        Some(_) if !res.spec.assignments.is_empty() => {
                            // Assignments written; the order manager commits them
                            classified.wait_for_order_manager.push(res);
                        }
                        Some(children) => {
                            let still_running = children.iter().any(|auction| {
                                robots.available.contains(auction.meta.robot())
                                    && auction.status.bid_state != BidState::Completed
                                    && auction.spec.valid_until > now
                            });
                            if still_running {
                                classified.auctions_running.push(res);
                            } else {
                                classified.auctions_to_close.push(res);
                            }
                        }
                    }
                }
                ReservationState::Succeeded | ReservationState::Timeout => {
                    classified.auctions_to_complete.push(res);
                }
                ReservationState::New | ReservationState::Accepted => {
                    classified.wait_for_order_manager.push(res);
                }
                ReservationState::Failed => {
                    error!(reservation = %res.meta.name, "reservation could not be classified");
                }
            }
        }

        debug!(
            to_create = classified.auctions_to_create.len(),
            running = classified.auctions_running.len(),
            to_close = classified.auctions_to_close.len(),
            to_complete = classified.auctions_to_complete.len(),
            waiting = classified.wait_for_order_manager.len(),
            "classified reservations"
        );

        classified
    }

    fn do_complete_auctions(
        &self,
        classified: &ClassifiedReservations,
        auction_map: &AuctionMap,
        auctions_per_robot: &mut CountPerRobot,
    ) {
        for res in &classified.auctions_to_complete {
            let Some(children) = auction_map.get(res.meta.auction_id()) else {
                continue;
            };
            for auction in children {
                if auction.spec.auction_state == AuctionState::Completed {
                    continue;
                }
                info!(auction = %auction.meta.name, "auction is completed");
                let mut updated = auction.clone();
                updated.spec.auction_state = AuctionState::Completed;
                match self.store.update(updated) {
                    Ok(_) => {
                        *auctions_per_robot
                            .entry(auction.meta.robot().to_string())
                            .or_insert(0) -= 1;
                    }
                    Err(err) => {
                        error!(auction = %auction.meta.name, %err, "error updating auction");
                    }
                }
            }
        }
    }

    fn do_close_auctions(
        &self,
        classified: &ClassifiedReservations,
        auction_map: &AuctionMap,
        robots: &RobotStates,
    ) {
        for res in &classified.auctions_to_close {
            let children = auction_map
                .get(res.meta.auction_id())
                .map(Vec::as_slice)
                .unwrap_or_default();

            let assignments = select_winners(res, children, &robots.available);
            // Without assignments the reservation is left alone and
            // retried on the next pass
            if assignments.is_empty() {
                debug!(reservation = %res.meta.name, "no assignments computed, skipping close");
                continue;
            }

            info!(
                reservation = %res.meta.name,
                count = assignments.len(),
                "adding order assignments to reservation"
            );
            let mut updated = res.clone();
            updated.spec.assignments = assignments;
            if let Err(err) = self.store.update(updated) {
                error!(reservation = %res.meta.name, %err, "error updating reservation with assignments");
                continue;
            }

            for auction in children {
                if auction.spec.auction_state == AuctionState::Closed {
                    continue;
                }
                info!(auction = %auction.meta.name, "auction is closed");
                let mut updated = auction.clone();
                updated.spec.auction_state = AuctionState::Closed;
                if let Err(err) = self.store.update(updated) {
                    error!(auction = %auction.meta.name, %err, "error updating auction");
                }
            }
        }
    }

    fn do_create_auctions(
        &self,
        config: &AuctioneerConfig,
        classified: &ClassifiedReservations,
        auction_map: &mut AuctionMap,
        auctions_per_robot: &mut CountPerRobot,
        orders_per_robot: &CountPerRobot,
        robots: &RobotStates,
    ) {
        // One invitation per available robot which has no other running
        // auction and is still below its maximum number of orders
        for res in &classified.auctions_to_create {
            if res.status.warehouse_orders.is_empty() {
                debug!(reservation = %res.meta.name, "reservation holds no orders, not opening auctions");
                continue;
            }
            let Some(valid_until) = res.status.valid_until else {
                error!(reservation = %res.meta.name, "reservation has orders but no deadline");
                continue;
            };
            let auction_id = res.meta.auction_id().to_string();
            for robot in &robots.available {
                let orders = orders_per_robot.get(robot).copied().unwrap_or(0);
                let auctions = auctions_per_robot.get(robot).copied().unwrap_or(0);
                if orders >= config.spec.policy.max_orders_per_robot || auctions != 0 {
                    continue;
                }
                let auction = Auction {
                    meta: Meta::new(format!("{}-{}", auction_id, robot))
                        .with_label(ROBOT_LABEL, robot.clone())
                        .with_label(AUCTION_LABEL, auction_id.clone())
                        .controlled_by(Reservation::KIND, &res.meta),
                    spec: AuctionSpec {
                        warehouse_orders: res.status.warehouse_orders.clone(),
                        valid_until: valid_until - CLOSE_BUFFER,
                        auction_state: AuctionState::Open,
                    },
                    status: Default::default(),
                };
                match self.store.create(auction) {
                    Ok(created) => {
                        debug!(auction = %created.meta.name, "auction created");
                        auction_map.entry(auction_id.clone()).or_default().push(created);
                        *auctions_per_robot.entry(robot.clone()).or_insert(0) += 1;
                    }
                    Err(err) => {
                        error!(auction_round = %auction_id, %err, "error creating auction");
                    }
                }
            }
            info!(
                count = auction_map.get(&auction_id).map(Vec::len).unwrap_or(0),
                auction_round = %auction_id,
                "auctions created for round"
            );
        }
    }

    fn do_create_reservations(
        &self,
        config: &AuctioneerConfig,
        classified: &ClassifiedReservations,
        auctions_per_robot: &CountPerRobot,
        orders_per_robot: &CountPerRobot,
        robots: &RobotStates,
    ) {
        // Request more warehouse orders only when no reservation for this
        // scope is already awaiting the order manager
        for res in &classified.wait_for_order_manager {
            if res.spec.request.scope == config.spec.scope {
                debug!(
                    reservation = %res.meta.name,
                    state = ?res.status.state,
                    "open reservation already awaiting order manager"
                );
                return;
            }
        }

        let mut robots_might_work: Vec<&String> = Vec::new();
        let mut create_reservation = false;
        for robot in &robots.available {
            let orders = orders_per_robot.get(robot).copied().unwrap_or(0);
            let auctions = auctions_per_robot.get(robot).copied().unwrap_or(0);
            if orders < config.spec.policy.max_orders_per_robot && auctions == 0 {
                robots_might_work.push(robot);
                if orders < config.spec.policy.min_orders_per_robot {
                    info!(
                        robot = %robot,
                        orders,
                        minimum = config.spec.policy.min_orders_per_robot,
                        "robot is below its minimum of warehouse orders, starting a new auction round"
                    );
                    create_reservation = true;
                }
            }
        }

        if !create_reservation {
            return;
        }

        // Offer more orders than needing robots so winner selection has
        // room to optimise
        let quantity = max_int(&[
            ORDERS_PER_NEEDY_ROBOT * robots_might_work.len() as i64,
            config.spec.policy.min_orders_per_auction,
        ]);

        let name = format!("{}.{}", config.spec.scope.warehouse, Utc::now().timestamp());
        let reservation = Reservation {
            meta: Meta::new(name.clone())
                .with_label(AUCTION_LABEL, name.clone())
                .controlled_by(AuctioneerConfig::KIND, &config.meta),
            spec: ReservationSpec {
                request: OrderRequest {
                    scope: config.spec.scope.clone(),
                    quantity,
                },
                assignments: Vec::new(),
            },
            status: Default::default(),
        };
        match self.store.create(reservation) {
            Ok(_) => {
                info!(reservation = %name, quantity, "created reservation requesting warehouse orders");
            }
            Err(err) => {
                error!(reservation = %name, %err, "error creating reservation");
            }
        }
    }

    fn do_cleanup_reservations(&self, classified: &ClassifiedReservations) {
        let mut done: Vec<&Reservation> = classified.auctions_to_complete.iter().collect();
        done.sort_by_key(|res| std::cmp::Reverse(res.meta.creation_time));

        // Auction children go with their reservation through the store's
        // cascading delete
        for res in done.iter().skip(MAX_COMPLETED_RESERVATIONS) {
            match self.store.delete::<Reservation>(&res.meta.name) {
                Ok(()) => info!(reservation = %res.meta.name, "cleaned up reservation"),
                Err(err) => {
                    error!(reservation = %res.meta.name, %err, "error cleaning up reservation");
                }
            }
        }
    }

    fn update_status(
        &self,
        config: &AuctioneerConfig,
        robots: &RobotStates,
        classified: &ClassifiedReservations,
        orders_per_robot: &CountPerRobot,
    ) -> Result<(), Error> {
        let mut new_status = AuctioneerStatus {
            robots_in_scope: robots.in_scope.iter().cloned().collect(),
            available_robots: robots.available.iter().cloned().collect(),
            warehouse_orders_in_process: orders_per_robot.values().sum(),
            running_auctions: classified.auctions_running.len() as i64,
            state: if !classified.auctions_running.is_empty() {
                AuctioneerState::Auction
            } else if !classified.wait_for_order_manager.is_empty()
                || !classified.auctions_to_close.is_empty()
            {
                AuctioneerState::Waiting
            } else {
                AuctioneerState::Watching
            },
            message: String::new(),
            // Carried over for comparison; rewritten below on change
            last_state_change_time: config.status.last_state_change_time,
            update_time: config.status.update_time,
        };

        if new_status == config.status {
            return Ok(());
        }

        let now = Utc::now();
        new_status.update_time = Some(now);
        if new_status.state != config.status.state {
            new_status.last_state_change_time = Some(now);
        }

        let mut updated = config.clone();
        updated.status = new_status;
        self.store.update(updated)?;
        debug!(auctioneer = %config.meta.name, "auctioneer status updated");
        Ok(())
    }

    /// Best-effort error report on the configuration status
    fn set_error_status(&self, name: &str, err: &Error) {
        if let Some(mut config) = self.store.get::<AuctioneerConfig>(name) {
            config.status.state = AuctioneerState::Error;
            config.status.message = err.to_string();
            config.status.update_time = Some(Utc::now());
            let _ = self.store.update(config);
        }
    }

    fn reconcile_result(
        &self,
        config: &AuctioneerConfig,
        robots: &RobotStates,
        classified: &ClassifiedReservations,
        orders_per_robot: &CountPerRobot,
    ) -> ReconcileStatus {
        let mut candidates: Vec<std::time::Duration> = Vec::new();

        let below_min = robots.available.iter().any(|robot| {
            orders_per_robot.get(robot).copied().unwrap_or(0)
                < config.spec.policy.min_orders_per_robot
        });
        if below_min {
            debug!(
                auctioneer = %config.meta.name,
                "a robot is below min_orders_per_robot, requeueing"
            );
            candidates.push(BELOW_MIN_REQUEUE);
        }

        // Wake up in time to close the earliest-expiring running auction
        let now = Utc::now();
        let earliest = classified
            .auctions_running
            .iter()
            .filter_map(|res| res.status.valid_until)
            .min();
        if let Some(deadline) = earliest {
            let until_close = (deadline - CLOSE_BUFFER) - now;
            candidates.push(until_close.to_std().unwrap_or(std::time::Duration::ZERO));
        }

        match candidates.into_iter().min() {
            Some(delay) => ReconcileStatus::requeue_after(delay),
            None => ReconcileStatus::done(),
        }
    }
}

impl Reconciler for AuctioneerController {
    async fn reconcile(&self, name: String) -> Result<ReconcileStatus, Error> {
        let Some(config) = self.store.get::<AuctioneerConfig>(&name) else {
            // Already deleted, nothing to do
            return Ok(ReconcileStatus::done());
        };

        let robots = self.get_robots(&config);

        let reservations = self.store.list_owned_by::<Reservation>(config.meta.uid);
        let (mut auction_map, mut auctions_per_robot) = self.map_auctions(&reservations);
        let classified = self.classify_reservations(reservations, &auction_map, &robots);
        let orders_per_robot = self.map_warehouse_orders(&robots);

        // Phase order is load-bearing: completing frees robots for new
        // auctions, closing precedes creating, cleanup always runs last
        self.do_complete_auctions(&classified, &auction_map, &mut auctions_per_robot);
        self.do_close_auctions(&classified, &auction_map, &robots);
        self.do_create_auctions(
            &config,
            &classified,
            &mut auction_map,
            &mut auctions_per_robot,
            &orders_per_robot,
            &robots,
        );
        self.do_create_reservations(
            &config,
            &classified,
            &auctions_per_robot,
            &orders_per_robot,
            &robots,
        );
        self.do_cleanup_reservations(&classified);

        if let Err(err) = self.update_status(&config, &robots, &classified, &orders_per_robot) {
            self.set_error_status(&name, &err);
            return Err(err);
        }

        Ok(self.reconcile_result(&config, &robots, &classified, &orders_per_robot))
    }
}
