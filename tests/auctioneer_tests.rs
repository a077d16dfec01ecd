//! Integration tests for the auctioneer controller

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use warebid::auctioneer::{AuctioneerController, select_winners};
use warebid::model::{
    AUCTION_LABEL, Auction, AuctionBid, AuctionPolicy, AuctionSpec, AuctionState,
    AuctioneerConfig, AuctioneerState, BidState, Meta, OrderBidding, OrderData, OrderRequest,
    ROBOT_LABEL, Reservation, ReservationSpec, ReservationState, RobotConfig, RobotConfigSpec,
    RobotMode, RobotState, RobotStatus, Scope,
};
use warebid::reconcile::Reconciler;
use warebid::store::{MemoryStore, Record};

fn scope() -> Scope {
    Scope::new("W1", "RB01", "RB-GROUP")
}

fn policy() -> AuctionPolicy {
    AuctionPolicy {
        max_orders_per_robot: 2,
        min_orders_per_robot: 1,
        min_orders_per_auction: 1,
    }
}

fn create_config(store: &MemoryStore) -> AuctioneerConfig {
    store
        .create(AuctioneerConfig::new("auctioneer-w1", scope(), policy()))
        .unwrap()
}

fn add_robot(store: &MemoryStore, name: &str, available: bool) {
    store
        .create(RobotConfig {
            meta: Meta::new(name),
            spec: RobotConfigSpec {
                scope: scope(),
                mode: RobotMode::Run,
                chargers: vec!["charger-1".to_string()],
                battery_min: 10.0,
                battery_ok: 60.0,
                battery_idle: 30.0,
            },
            status: Default::default(),
        })
        .unwrap();
    let mut status = RobotStatus {
        meta: Meta::new(name).with_label(ROBOT_LABEL, name),
        status: Default::default(),
    };
    status.status.state = if available {
        RobotState::Available
    } else {
        RobotState::Error
    };
    status.status.battery_percentage = 80.0;
    store.create(status).unwrap();
}

fn set_robot_state(store: &MemoryStore, name: &str, state: RobotState) {
    let mut status = store.get::<RobotStatus>(name).unwrap();
    status.status.state = state;
    store.update(status).unwrap();
}

fn orders(count: usize) -> Vec<OrderData> {
    (0..count)
        .map(|i| {
            OrderData::new("W1", format!("order-{}", i + 1)).with_task(
                &format!("task-{}", i + 1),
                &format!("BIN-{:02}", i + 1),
                &format!("BIN-{:02}", i + 2),
            )
        })
        .collect()
}

/// Reservation already filled by the order manager
fn create_filled_reservation(
    store: &MemoryStore,
    config: &AuctioneerConfig,
    name: &str,
    orders: Vec<OrderData>,
) -> Reservation {
    let created = store
        .create(Reservation {
            meta: Meta::new(name)
                .with_label(AUCTION_LABEL, name)
                .controlled_by(AuctioneerConfig::KIND, &config.meta),
            spec: ReservationSpec {
                request: OrderRequest {
                    scope: scope(),
                    quantity: orders.len() as i64,
                },
                assignments: Vec::new(),
            },
            status: Default::default(),
        })
        .unwrap();
    let mut filled = created;
    filled.status.warehouse_orders = orders;
    filled.status.valid_until = Some(Utc::now() + ChronoDuration::minutes(5));
    filled.status.state = ReservationState::Reservations;
    store.update(filled).unwrap()
}

fn set_biddings(store: &MemoryStore, auction_name: &str, biddings: Vec<(&str, f64)>) {
    let mut auction = store.get::<Auction>(auction_name).unwrap();
    auction.status.biddings = biddings
        .into_iter()
        .map(|(order_id, bidding)| OrderBidding {
            warehouse: "W1".to_string(),
            order_id: order_id.to_string(),
            bidding,
        })
        .collect();
    auction.status.bid_state = BidState::Completed;
    store.update(auction).unwrap();
}

#[tokio::test]
async fn creates_reservation_when_robots_need_work() {
    let store = MemoryStore::new();
    let _config = create_config(&store);
    add_robot(&store, "robot-a", true);
    add_robot(&store, "robot-b", true);

    let controller = AuctioneerController::new(
        store.clone(),
        ["robot-a".to_string(), "robot-b".to_string()],
    );
    let status = controller
        .reconcile("auctioneer-w1".to_string())
        .await
        .unwrap();

    let reservations = store.list::<Reservation>();
    assert_eq!(reservations.len(), 1);
    // Two needy robots, three orders offered per robot
    assert_eq!(reservations[0].spec.request.quantity, 6);
    assert_eq!(reservations[0].spec.request.scope, scope());
    assert_eq!(
        reservations[0].meta.owner.as_ref().unwrap().name,
        "auctioneer-w1"
    );

    // Robots still below their minimum: check back in 30 seconds
    assert_eq!(status.requeue_after, Some(Duration::from_secs(30)));

    let config = store.get::<AuctioneerConfig>("auctioneer-w1").unwrap();
    assert_eq!(
        config.status.available_robots,
        vec!["robot-a".to_string(), "robot-b".to_string()]
    );

    // The next level-triggered pass observes the reservation awaiting the
    // order manager
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();
    let config = store.get::<AuctioneerConfig>("auctioneer-w1").unwrap();
    assert_eq!(config.status.state, AuctioneerState::Waiting);
}

#[tokio::test]
async fn does_not_duplicate_open_reservations() {
    let store = MemoryStore::new();
    let _config = create_config(&store);
    add_robot(&store, "robot-a", true);

    let controller = AuctioneerController::new(store.clone(), ["robot-a".to_string()]);
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    assert_eq!(store.list::<Reservation>().len(), 1);
}

#[tokio::test]
async fn opens_one_auction_per_available_robot() {
    let store = MemoryStore::new();
    let config = create_config(&store);
    add_robot(&store, "robot-a", true);
    add_robot(&store, "robot-b", true);
    add_robot(&store, "robot-c", false);
    let reservation = create_filled_reservation(&store, &config, "w1.100", orders(3));

    let controller = AuctioneerController::new(
        store.clone(),
        ["robot-a", "robot-b", "robot-c"].map(String::from),
    );
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    let mut auctions = store.list::<Auction>();
    auctions.sort_by(|a, b| a.meta.name.cmp(&b.meta.name));
    assert_eq!(auctions.len(), 2);
    assert_eq!(auctions[0].meta.name, "w1.100-robot-a");
    assert_eq!(auctions[1].meta.name, "w1.100-robot-b");
    for auction in &auctions {
        assert_eq!(auction.spec.auction_state, AuctionState::Open);
        assert_eq!(auction.spec.warehouse_orders.len(), 3);
        assert_eq!(auction.meta.auction_id(), "w1.100");
        assert_eq!(
            auction.spec.valid_until,
            reservation.status.valid_until.unwrap() - ChronoDuration::seconds(10)
        );
        assert_eq!(auction.meta.owner.as_ref().unwrap().name, "w1.100");
    }

    // The follow-up pass observes the open auctions as running
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();
    let config = store.get::<AuctioneerConfig>("auctioneer-w1").unwrap();
    assert_eq!(config.status.state, AuctioneerState::Auction);
    assert_eq!(config.status.running_auctions, 1);
}

#[tokio::test]
async fn does_not_open_auctions_for_empty_reservation() {
    let store = MemoryStore::new();
    let config = create_config(&store);
    add_robot(&store, "robot-a", true);
    create_filled_reservation(&store, &config, "w1.100", Vec::new());

    let controller = AuctioneerController::new(store.clone(), ["robot-a".to_string()]);
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    assert!(store.list::<Auction>().is_empty());
}

#[tokio::test]
async fn closes_auctions_and_writes_assignments() {
    let store = MemoryStore::new();
    let config = create_config(&store);
    add_robot(&store, "robot-a", true);
    add_robot(&store, "robot-b", true);
    create_filled_reservation(&store, &config, "w1.100", orders(3));

    let controller = AuctioneerController::new(
        store.clone(),
        ["robot-a".to_string(), "robot-b".to_string()],
    );
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    set_biddings(
        &store,
        "w1.100-robot-a",
        vec![("order-1", 5.0), ("order-2", 7.5), ("order-3", 12.0)],
    );
    set_biddings(
        &store,
        "w1.100-robot-b",
        vec![("order-1", 9.0), ("order-2", 6.0), ("order-3", 8.0)],
    );

    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    let reservation = store.get::<Reservation>("w1.100").unwrap();
    assert_eq!(reservation.spec.assignments.len(), 2);
    let pairs: Vec<(String, String)> = reservation
        .spec
        .assignments
        .iter()
        .map(|a| (a.order_id.clone(), a.robot.clone()))
        .collect();
    assert!(pairs.contains(&("order-1".to_string(), "robot-a".to_string())));
    assert!(pairs.contains(&("order-2".to_string(), "robot-b".to_string())));

    for auction in store.list::<Auction>() {
        assert_eq!(auction.spec.auction_state, AuctionState::Closed);
    }
}

#[tokio::test]
async fn discards_biddings_of_robot_that_became_unavailable() {
    let store = MemoryStore::new();
    let config = create_config(&store);
    add_robot(&store, "robot-a", true);
    add_robot(&store, "robot-b", true);
    create_filled_reservation(&store, &config, "w1.100", orders(3));

    let controller = AuctioneerController::new(
        store.clone(),
        ["robot-a".to_string(), "robot-b".to_string()],
    );
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    set_biddings(&store, "w1.100-robot-a", vec![("order-1", 5.0)]);
    set_biddings(&store, "w1.100-robot-b", vec![("order-1", 2.0), ("order-2", 3.0)]);

    // Robot-b errors out after bidding and before close
    set_robot_state(&store, "robot-b", RobotState::Error);

    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    let reservation = store.get::<Reservation>("w1.100").unwrap();
    assert_eq!(reservation.spec.assignments.len(), 1);
    assert_eq!(reservation.spec.assignments[0].order_id, "order-1");
    assert_eq!(reservation.spec.assignments[0].robot, "robot-a");
}

#[tokio::test]
async fn skips_close_when_no_assignments_result() {
    let store = MemoryStore::new();
    let config = create_config(&store);
    add_robot(&store, "robot-a", true);
    create_filled_reservation(&store, &config, "w1.100", orders(2));

    let controller = AuctioneerController::new(store.clone(), ["robot-a".to_string()]);
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    // Bid completed with an empty bidding vector
    set_biddings(&store, "w1.100-robot-a", Vec::new());
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    let reservation = store.get::<Reservation>("w1.100").unwrap();
    assert!(reservation.spec.assignments.is_empty());
    // Auction is left open for the next tick
    let auction = store.get::<Auction>("w1.100-robot-a").unwrap();
    assert_eq!(auction.spec.auction_state, AuctionState::Open);
}

#[tokio::test]
async fn completes_auctions_of_finished_reservations() {
    let store = MemoryStore::new();
    let config = create_config(&store);
    add_robot(&store, "robot-a", true);
    create_filled_reservation(&store, &config, "w1.100", orders(2));

    let controller = AuctioneerController::new(store.clone(), ["robot-a".to_string()]);
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    set_biddings(&store, "w1.100-robot-a", vec![("order-1", 5.0)]);
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    // Order manager committed the assignments
    let mut reservation = store.get::<Reservation>("w1.100").unwrap();
    reservation.status.state = ReservationState::Succeeded;
    store.update(reservation).unwrap();

    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    let auction = store.get::<Auction>("w1.100-robot-a").unwrap();
    assert_eq!(auction.spec.auction_state, AuctionState::Completed);
}

#[tokio::test]
async fn repeated_reconcile_with_same_state_writes_nothing() {
    let store = MemoryStore::new();
    let config = create_config(&store);
    add_robot(&store, "robot-a", true);
    create_filled_reservation(&store, &config, "w1.100", orders(2));

    let controller = AuctioneerController::new(store.clone(), ["robot-a".to_string()]);
    // Two passes settle the status; the third must not write anything
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    let auctions_before: Vec<(String, u64)> = store
        .list::<Auction>()
        .into_iter()
        .map(|a| (a.meta.name.clone(), a.meta.generation))
        .collect();
    let config_generation = store
        .get::<AuctioneerConfig>("auctioneer-w1")
        .unwrap()
        .meta
        .generation;
    let reservation_count = store.list::<Reservation>().len();

    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    let auctions_after: Vec<(String, u64)> = store
        .list::<Auction>()
        .into_iter()
        .map(|a| (a.meta.name.clone(), a.meta.generation))
        .collect();
    assert_eq!(auctions_before, auctions_after);
    assert_eq!(store.list::<Reservation>().len(), reservation_count);
    assert_eq!(
        store
            .get::<AuctioneerConfig>("auctioneer-w1")
            .unwrap()
            .meta
            .generation,
        config_generation
    );
}

#[tokio::test]
async fn cleanup_keeps_the_newest_fifty_reservations() {
    let store = MemoryStore::new();
    let config = create_config(&store);

    for i in 0..70i64 {
        let mut meta = Meta::new(format!("w1.{}", i))
            .with_label(AUCTION_LABEL, format!("w1.{}", i))
            .controlled_by(AuctioneerConfig::KIND, &config.meta);
        meta.creation_time = Utc::now() - ChronoDuration::minutes(70 - i);
        let created = store
            .create(Reservation {
                meta,
                spec: ReservationSpec {
                    request: OrderRequest {
                        scope: scope(),
                        quantity: 1,
                    },
                    assignments: Vec::new(),
                },
                status: Default::default(),
            })
            .unwrap();
        let mut finished = created.clone();
        finished.status.state = ReservationState::Succeeded;
        store.update(finished).unwrap();

        // One auction child each, removed through the cascading delete
        store
            .create(Auction {
                meta: Meta::new(format!("w1.{}-robot-a", i))
                    .with_label(ROBOT_LABEL, "robot-a")
                    .with_label(AUCTION_LABEL, format!("w1.{}", i))
                    .controlled_by(Reservation::KIND, &created.meta),
                spec: AuctionSpec {
                    warehouse_orders: Vec::new(),
                    valid_until: Utc::now(),
                    auction_state: AuctionState::Completed,
                },
                status: AuctionBid::default(),
            })
            .unwrap();
    }

    let controller = AuctioneerController::new(store.clone(), ["robot-a".to_string()]);
    controller.reconcile("auctioneer-w1".to_string()).await.unwrap();

    let remaining = store.list::<Reservation>();
    assert_eq!(remaining.len(), 50);
    // The oldest twenty are gone
    assert!(remaining.iter().all(|r| {
        let index: i64 = r.meta.name.trim_start_matches("w1.").parse().unwrap();
        index >= 20
    }));
    assert_eq!(store.list::<Auction>().len(), 50);
}

#[tokio::test]
async fn zero_available_robots_still_completes_and_cleans_up() {
    let store = MemoryStore::new();
    let config = create_config(&store);
    let created = create_filled_reservation(&store, &config, "w1.100", orders(1));
    let mut finished = created;
    finished.status.state = ReservationState::Succeeded;
    store.update(finished).unwrap();

    let controller = AuctioneerController::new(store.clone(), ["robot-a".to_string()]);
    let status = controller
        .reconcile("auctioneer-w1".to_string())
        .await
        .unwrap();

    assert!(store.list::<Auction>().is_empty());
    assert_eq!(status.requeue_after, None);
    let config = store.get::<AuctioneerConfig>("auctioneer-w1").unwrap();
    assert_eq!(config.status.state, AuctioneerState::Watching);
}

// Direct winner-selection properties

fn reservation_with_orders(orders: Vec<OrderData>) -> Reservation {
    let mut reservation = Reservation {
        meta: Meta::new("w1.200").with_label(AUCTION_LABEL, "w1.200"),
        spec: ReservationSpec {
            request: OrderRequest {
                scope: scope(),
                quantity: orders.len() as i64,
            },
            assignments: Vec::new(),
        },
        status: Default::default(),
    };
    reservation.status.warehouse_orders = orders;
    reservation.status.state = ReservationState::Reservations;
    reservation
}

fn auction_with_biddings(robot: &str, biddings: Vec<(&str, f64)>) -> Auction {
    Auction {
        meta: Meta::new(format!("w1.200-{}", robot))
            .with_label(ROBOT_LABEL, robot)
            .with_label(AUCTION_LABEL, "w1.200"),
        spec: AuctionSpec {
            warehouse_orders: Vec::new(),
            valid_until: Utc::now(),
            auction_state: AuctionState::Open,
        },
        status: AuctionBid {
            bid_state: BidState::Completed,
            biddings: biddings
                .into_iter()
                .map(|(order_id, bidding)| OrderBidding {
                    warehouse: "W1".to_string(),
                    order_id: order_id.to_string(),
                    bidding,
                })
                .collect(),
        },
    }
}

fn available(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn winner_selection_prioritizes_overdue_orders() {
    let mut orders = orders(3);
    orders[2].latest_start = Some(Utc::now() - ChronoDuration::minutes(10));
    let reservation = reservation_with_orders(orders);

    let auctions = vec![
        auction_with_biddings(
            "robot-a",
            vec![("order-1", 5.0), ("order-2", 7.5), ("order-3", 12.0)],
        ),
        auction_with_biddings(
            "robot-b",
            vec![("order-1", 9.0), ("order-2", 6.0), ("order-3", 8.0)],
        ),
    ];

    let assignments = select_winners(
        &reservation,
        &auctions,
        &available(&["robot-a", "robot-b"]),
    );

    // Overdue order-3 goes to its cheapest bidder first, then order-1 to
    // robot-a greedily; order-2 stays unassigned, one order per robot
    assert_eq!(assignments.len(), 2);
    assert_eq!(assignments[0].order_id, "order-3");
    assert_eq!(assignments[0].robot, "robot-b");
    assert_eq!(assignments[1].order_id, "order-1");
    assert_eq!(assignments[1].robot, "robot-a");
}

#[test]
fn overdue_fallback_only_picks_auction_participants() {
    let mut orders = orders(1);
    orders[0].latest_start = Some(Utc::now() - ChronoDuration::minutes(1));
    let reservation = reservation_with_orders(orders);

    // robot-b participated but did not bid; robot-x is available yet never
    // received an auction and must not win
    let auctions = vec![auction_with_biddings("robot-b", Vec::new())];
    let assignments = select_winners(
        &reservation,
        &auctions,
        &available(&["robot-b", "robot-x"]),
    );

    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].robot, "robot-b");
}

#[test]
fn winner_selection_returns_a_matching() {
    let reservation = reservation_with_orders(orders(3));
    let auctions = vec![
        auction_with_biddings(
            "robot-a",
            vec![("order-1", 1.0), ("order-2", 2.0), ("order-3", 3.0)],
        ),
        auction_with_biddings(
            "robot-b",
            vec![("order-1", 1.5), ("order-2", 2.5), ("order-3", 3.5)],
        ),
    ];

    let assignments = select_winners(
        &reservation,
        &auctions,
        &available(&["robot-a", "robot-b"]),
    );

    let mut robots: Vec<&str> = assignments.iter().map(|a| a.robot.as_str()).collect();
    let mut order_ids: Vec<&str> = assignments.iter().map(|a| a.order_id.as_str()).collect();
    robots.sort();
    robots.dedup();
    order_ids.sort();
    order_ids.dedup();
    assert_eq!(robots.len(), assignments.len());
    assert_eq!(order_ids.len(), assignments.len());
}

#[test]
fn winner_selection_ignores_unavailable_participants() {
    let reservation = reservation_with_orders(orders(2));
    let auctions = vec![
        auction_with_biddings("robot-a", vec![("order-1", 5.0)]),
        auction_with_biddings("robot-b", vec![("order-1", 1.0), ("order-2", 1.0)]),
    ];

    let assignments = select_winners(&reservation, &auctions, &available(&["robot-a"]));

    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].robot, "robot-a");
    assert_eq!(assignments[0].order_id, "order-1");
}
