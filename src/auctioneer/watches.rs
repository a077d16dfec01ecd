//! Watch-to-reconcile mappings for the auctioneer
//!
//! Each task subscribes to one record kind and translates its events into
//! reconcile requests for the affected auctioneer configurations. Mapping
//! is deliberately generous: a spurious reconcile is harmless because the
//! controller is level triggered.

use crate::model::{
    Auction, AuctioneerConfig, Reservation, RobotConfig, RobotState, RobotStatus, WarehouseOrder,
};
use crate::reconcile::EnqueueHandle;
use crate::store::{MemoryStore, Record, StoreEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::debug;

/// Enqueue every auctioneer listing this robot in its scope
fn enqueue_for_robot(store: &MemoryStore, handle: &EnqueueHandle, robot: &str) {
    for config in store.list::<AuctioneerConfig>() {
        if config.status.robots_in_scope.iter().any(|r| r == robot) {
            debug!(auctioneer = %config.meta.name, robot, "reconcile triggered by robot record");
            handle.enqueue(config.meta.name);
        }
    }
}

/// Spawn the watch tasks feeding one auctioneer runner
pub fn spawn_auctioneer_watches(
    store: Arc<MemoryStore>,
    handle: EnqueueHandle,
    deployed_robots: HashSet<String>,
) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();

    // Any auctioneer configuration change reconciles that configuration
    {
        let handle = handle.clone();
        let mut events = store.watch::<AuctioneerConfig>();
        tasks.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => handle.enqueue(event.record().name()),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    // Reservation events map through the controlling configuration
    {
        let handle = handle.clone();
        let mut events = store.watch::<Reservation>();
        tasks.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(owner) = &event.record().meta().owner
                            && owner.kind == AuctioneerConfig::KIND
                        {
                            handle.enqueue(owner.name.clone());
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    // Auction events map through the robot label
    {
        let handle = handle.clone();
        let store = store.clone();
        let deployed = deployed_robots.clone();
        let mut events = store.watch::<Auction>();
        tasks.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let robot = event.record().meta().robot().to_string();
                        if deployed.contains(&robot) {
                            enqueue_for_robot(&store, &handle, &robot);
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    // Robot status updates matter once the robot reports available
    {
        let handle = handle.clone();
        let store = store.clone();
        let deployed = deployed_robots.clone();
        let mut events = store.watch::<RobotStatus>();
        tasks.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(StoreEvent::Applied(rs)) => {
                        if rs.status.state == RobotState::Available
                            && deployed.contains(&rs.meta.name)
                        {
                            enqueue_for_robot(&store, &handle, &rs.meta.name);
                        }
                    }
                    Ok(StoreEvent::Deleted(_)) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    // Robot configuration edits map through scope equality
    {
        let handle = handle.clone();
        let store = store.clone();
        let deployed = deployed_robots.clone();
        let mut events = store.watch::<RobotConfig>();
        tasks.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(StoreEvent::Applied(rc)) => {
                        if !deployed.contains(&rc.meta.name) {
                            continue;
                        }
                        for config in store.list::<AuctioneerConfig>() {
                            if config.spec.scope == rc.spec.scope {
                                debug!(
                                    auctioneer = %config.meta.name,
                                    robot = %rc.meta.name,
                                    "reconcile triggered by robot configuration"
                                );
                                handle.enqueue(config.meta.name);
                            }
                        }
                    }
                    Ok(StoreEvent::Deleted(_)) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    // Warehouse-order completion or deletion frees robot capacity
    {
        let handle = handle.clone();
        let store = store.clone();
        let mut events = store.watch::<WarehouseOrder>();
        tasks.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let robot = event.record().meta().robot().to_string();
                        if deployed_robots.contains(&robot) {
                            enqueue_for_robot(&store, &handle, &robot);
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    tasks
}
