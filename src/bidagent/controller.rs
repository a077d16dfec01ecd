//! Reconcile controller for the bid agent

use super::{BID_BUFFER, REQUEST_BUFFER};
use crate::error::Error;
use crate::model::{
    AUCTION_LABEL, Auction, AuctionState, BidState, Meta, Mission, OrderBidding, OrderStatus,
    PathKey, ROBOT_LABEL, RunTime, TravelTimeCalculation, TravelTimeSpec, TravelTimeState,
    WarehouseOrder,
};
use crate::reconcile::{ReconcileStatus, Reconciler};
use crate::store::{MemoryStore, Record};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Level-triggered reconciler bidding on auctions for one robot
pub struct BidAgentController {
    store: Arc<MemoryStore>,
    robot_name: String,
}

impl BidAgentController {
    pub fn new(store: Arc<MemoryStore>, robot_name: impl Into<String>) -> Self {
        Self {
            store,
            robot_name: robot_name.into(),
        }
    }

    /// The robot's most probable position at the time it would begin the
    /// first task of a candidate order.
    ///
    /// Running orders win over missions: if any warehouse order labelled
    /// with this robot is running, the start position is the destination
    /// bin of the last task of the order with the highest sequence.
    /// Otherwise the newest mission still predicting a position supplies
    /// the target of its final action. Empty when neither exists.
    fn estimate_start_position(&self) -> String {
        let mut orders: Vec<WarehouseOrder> = self
            .store
            .list_filtered(|order: &WarehouseOrder| {
                order.meta.robot() == self.robot_name
                    && order.spec.order_status == OrderStatus::Running
            });
        orders.sort_by_key(|order| std::cmp::Reverse(order.spec.sequence));

        if let Some(order) = orders.first()
            && let Some(task) = order.spec.data.tasks.last()
            && !task.dest_bin.is_empty()
        {
            info!(
                position = %task.dest_bin,
                order = %order.meta.name,
                "estimated start position from running warehouse order"
            );
            return task.dest_bin.clone();
        }

        let mut missions: Vec<Mission> = self
            .store
            .list_labeled(ROBOT_LABEL, &self.robot_name);
        missions.sort_by_key(|mission| std::cmp::Reverse(mission.meta.creation_time));

        for mission in &missions {
            if mission.status.state.predicts_position()
                && let Some(action) = mission.spec.actions.last()
            {
                info!(
                    position = %action.target(),
                    mission = %mission.meta.name,
                    "estimated start position from mission"
                );
                return action.target().to_string();
            }
        }

        String::new()
    }

    /// File the travel-time request for an auction. Returns false when the
    /// auction has no orders with tasks and therefore nothing to bid on.
    fn request_travel_times(&self, auction: &Auction) -> Result<bool, Error> {
        let start_position = self.estimate_start_position();

        // Requesting one path per order: start position to the source bin
        // of the order's first task. Shuffling desynchronises the robots
        // so they do not all race on the same order when time is scarce.
        let mut orders = auction.spec.warehouse_orders.clone();
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let mut rng = StdRng::seed_from_u64(seed);
        orders.shuffle(&mut rng);

        let mut paths: Vec<PathKey> = Vec::new();
        for order in &orders {
            if let Some(task) = order.tasks.first() {
                let path = PathKey::new(start_position.clone(), task.source_bin.clone());
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }

        if paths.is_empty() {
            info!(auction = %auction.meta.name, "no paths identified, not bidding");
            return Ok(false);
        }

        let request = TravelTimeCalculation {
            meta: Meta::new(auction.meta.name.clone())
                .with_label(ROBOT_LABEL, self.robot_name.clone())
                .with_label(AUCTION_LABEL, auction.meta.auction_id())
                .controlled_by(Auction::KIND, &auction.meta),
            spec: TravelTimeSpec {
                start_position,
                paths,
                valid_until: auction.spec.valid_until - BID_BUFFER - REQUEST_BUFFER,
            },
            status: Default::default(),
        };
        self.store.create(request)?;

        let mut updated = auction.clone();
        updated.status.bid_state = BidState::Running;
        self.store.update(updated)?;
        Ok(true)
    }

    /// Write the bidding vector and complete the bid in a single update
    fn close_bid(
        &self,
        auction: &Auction,
        start_position: &str,
        travel_times: &HashMap<PathKey, f64>,
    ) -> Result<(), Error> {
        info!(auction = %auction.meta.name, "closing bid");

        let mut biddings: Vec<OrderBidding> = Vec::new();
        for order in &auction.spec.warehouse_orders {
            let Some(task) = order.tasks.first() else {
                continue;
            };
            let path = PathKey::new(start_position, task.source_bin.clone());
            let bidding = if let Some(&seconds) = travel_times.get(&path) {
                debug!(order = %order.order_id, path = %path, seconds, "bidding from travel time");
                seconds
            } else if path.start == path.goal {
                // Trivially close; no travel needed
                debug!(order = %order.order_id, path = %path, "start equals goal, bidding 1");
                1.0
            } else {
                debug!(order = %order.order_id, path = %path, "no travel time, skipping order");
                continue;
            };
            biddings.push(OrderBidding {
                warehouse: order.warehouse.clone(),
                order_id: order.order_id.clone(),
                bidding,
            });
        }

        let count = biddings.len();
        let mut updated = auction.clone();
        updated.status.biddings = biddings;
        updated.status.bid_state = BidState::Completed;
        self.store.update(updated)?;

        info!(auction = %auction.meta.name, count, "bid completed");
        Ok(())
    }
}

impl Reconciler for BidAgentController {
    async fn reconcile(&self, name: String) -> Result<ReconcileStatus, Error> {
        let Some(auction) = self.store.get::<Auction>(&name) else {
            debug!(auction = %name, "auction already deleted");
            return Ok(ReconcileStatus::done());
        };

        if auction.meta.robot() != self.robot_name {
            return Ok(ReconcileStatus::done());
        }
        if auction.spec.auction_state != AuctionState::Open {
            debug!(auction = %name, "auction is not open anymore");
            return Ok(ReconcileStatus::done());
        }
        if auction.status.bid_state == BidState::Completed {
            debug!(auction = %name, "bid already completed");
            return Ok(ReconcileStatus::done());
        }

        let now = Utc::now();
        let close_at = auction.spec.valid_until - BID_BUFFER;

        let requests = self
            .store
            .list_owned_by::<TravelTimeCalculation>(auction.meta.uid);

        if requests.is_empty() {
            if now >= close_at {
                // First sight after the deadline: bid with what we have,
                // which is nothing
                self.close_bid(&auction, "", &HashMap::new())?;
                return Ok(ReconcileStatus::done());
            }

            info!(
                auction = %auction.meta.name,
                orders = auction.spec.warehouse_orders.len(),
                "new auction arrived, requesting travel times"
            );
            if !self.request_travel_times(&auction)? {
                // Nothing to bid on; leave the auction alone
                return Ok(ReconcileStatus::done());
            }

            let requeue = (close_at - now).to_std().unwrap_or_default();
            debug!(auction = %auction.meta.name, ?requeue, "requeue until bid close");
            return Ok(ReconcileStatus::requeue_after(requeue));
        }

        // Close once the estimator finished or the deadline forces us to
        let mut close = now >= close_at;
        if close {
            info!(
                auction = %auction.meta.name,
                valid_until = %auction.spec.valid_until,
                "auction expires soon, closing bid"
            );
        }
        let mut travel_times: HashMap<PathKey, f64> = HashMap::new();
        let mut start_position = String::new();
        for request in &requests {
            if request.status.state == TravelTimeState::Processed || close {
                close = true;
                start_position = request.spec.start_position.clone();
                for RunTime { start, goal, seconds } in &request.status.run_times {
                    travel_times.insert(PathKey::new(start.clone(), goal.clone()), *seconds);
                }
            }
        }

        if close {
            self.close_bid(&auction, &start_position, &travel_times)?;
            return Ok(ReconcileStatus::done());
        }

        let requeue = (close_at - now).to_std().unwrap_or_default();
        Ok(ReconcileStatus::requeue_after(requeue))
    }
}
