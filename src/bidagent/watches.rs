//! Watch-to-reconcile mappings for the bid agent

use crate::model::{Auction, TravelTimeCalculation};
use crate::reconcile::EnqueueHandle;
use crate::store::{MemoryStore, Record, StoreEvent};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Spawn the watch tasks feeding one bid-agent runner: auctions addressed
/// to this robot, and travel-time results owned by such auctions.
pub fn spawn_bid_agent_watches(
    store: Arc<MemoryStore>,
    handle: EnqueueHandle,
    robot_name: String,
) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();

    {
        let handle = handle.clone();
        let robot_name = robot_name.clone();
        let mut events = store.watch::<Auction>();
        tasks.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(StoreEvent::Applied(auction)) => {
                        if auction.meta.robot() == robot_name {
                            handle.enqueue(auction.meta.name);
                        }
                    }
                    Ok(StoreEvent::Deleted(_)) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    {
        let mut events = store.watch::<TravelTimeCalculation>();
        tasks.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(StoreEvent::Applied(request)) => {
                        if let Some(owner) = &request.meta.owner
                            && owner.kind == Auction::KIND
                            && request.meta.robot() == robot_name
                        {
                            handle.enqueue(owner.name.clone());
                        }
                    }
                    Ok(StoreEvent::Deleted(_)) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    tasks
}
