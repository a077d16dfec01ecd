//! Winner selection at auction close

use crate::model::{Auction, OrderAssignment, OrderBidding, Reservation};
use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

struct BiddingWithRobot<'a> {
    robot: &'a str,
    bidding: &'a OrderBidding,
}

/// Compute the assignment for one reservation from the biddings of its
/// auction children.
///
/// The result is a matching: each robot gets at most one order, each
/// order at most one robot. Only robots that are currently available and
/// took part in the auction can win. Orders whose latest start date is
/// already overdue are assigned first, each to the cheapest bidder still
/// free; an overdue order nobody bid on falls back to any free
/// participating robot. The remaining biddings are walked cheapest-first.
pub fn select_winners(
    reservation: &Reservation,
    auctions: &[Auction],
    available: &BTreeSet<String>,
) -> Vec<OrderAssignment> {
    let mut assignments: Vec<OrderAssignment> = Vec::new();
    let mut robots_assigned: HashSet<&str> = HashSet::new();
    let mut orders_assigned: HashSet<&str> = HashSet::new();

    // Biddings of unavailable robots are discarded; a robot that lost its
    // availability between open and close must not win.
    let mut biddings: Vec<BiddingWithRobot<'_>> = Vec::new();
    let mut participants: BTreeSet<&str> = BTreeSet::new();
    for auction in auctions {
        let robot = auction.meta.robot();
        if !available.contains(robot) {
            info!(
                robot,
                auction = %auction.meta.name,
                "robot is not available, skipping its biddings"
            );
            continue;
        }
        participants.insert(robot);
        for bidding in &auction.status.biddings {
            biddings.push(BiddingWithRobot { robot, bidding });
        }
    }

    // Stable: ties keep insertion order
    biddings.sort_by(|a, b| a.bidding.bidding.total_cmp(&b.bidding.bidding));

    // Overdue orders first, most overdue leading
    let now = Utc::now();
    let mut overdue: Vec<_> = reservation
        .status
        .warehouse_orders
        .iter()
        .filter(|order| order.is_overdue(now))
        .collect();
    overdue.sort_by_key(|order| order.latest_start);

    for order in overdue {
        info!(
            order = %order.order_id,
            latest_start = ?order.latest_start,
            "latest start date is overdue, prioritizing assignment"
        );
        for entry in &biddings {
            if orders_assigned.contains(order.order_id.as_str())
                || robots_assigned.contains(entry.robot)
            {
                continue;
            }
            if entry.bidding.order_id == order.order_id
                && entry.bidding.warehouse == order.warehouse
            {
                info!(
                    order = %order.order_id,
                    robot = entry.robot,
                    bidding = entry.bidding.bidding,
                    "assigning overdue order to cheapest bidder"
                );
                assignments.push(OrderAssignment {
                    warehouse: entry.bidding.warehouse.clone(),
                    order_id: entry.bidding.order_id.clone(),
                    robot: entry.robot.to_string(),
                });
                robots_assigned.insert(entry.robot);
                orders_assigned.insert(&order.order_id);
                break;
            }
        }
        // Nobody bid on it: fall back to any free robot that took part in
        // the auction and is still available
        if !orders_assigned.contains(order.order_id.as_str()) {
            for &robot in &participants {
                if !robots_assigned.contains(robot) {
                    info!(
                        order = %order.order_id,
                        robot,
                        "no bidding for overdue order, assigning fallback participant"
                    );
                    assignments.push(OrderAssignment {
                        warehouse: order.warehouse.clone(),
                        order_id: order.order_id.clone(),
                        robot: robot.to_string(),
                    });
                    robots_assigned.insert(robot);
                    orders_assigned.insert(&order.order_id);
                    break;
                }
            }
        }
    }

    // Greedy pass over the remaining biddings
    for entry in &biddings {
        if !orders_assigned.contains(entry.bidding.order_id.as_str())
            && !robots_assigned.contains(entry.robot)
        {
            debug!(
                order = %entry.bidding.order_id,
                robot = entry.robot,
                bidding = entry.bidding.bidding,
                "assigning order to cheapest free bidder"
            );
            assignments.push(OrderAssignment {
                warehouse: entry.bidding.warehouse.clone(),
                order_id: entry.bidding.order_id.clone(),
                robot: entry.robot.to_string(),
            });
            robots_assigned.insert(entry.robot);
            orders_assigned.insert(&entry.bidding.order_id);
        }
    }

    assignments
}
