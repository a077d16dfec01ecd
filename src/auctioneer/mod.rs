//! Warehouse-wide auctioneer
//!
//! For its scope, the auctioneer keeps the invariant that every available
//! robot below its minimum order count eventually receives work: it
//! solicits order reservations from the order manager, opens one auction
//! per robot when orders arrive, closes auctions by selecting winners and
//! commits the assignments back onto the reservation.

pub mod controller;
pub mod watches;
pub mod winners;

pub use controller::AuctioneerController;
pub use watches::spawn_auctioneer_watches;
pub use winners::select_winners;

use std::time::Duration;

/// Auctions close this long before their reservation expires
pub const CLOSE_BUFFER: chrono::Duration = chrono::Duration::seconds(10);

/// Completed reservations kept before cleanup deletes the oldest
pub const MAX_COMPLETED_RESERVATIONS: usize = 50;

/// Requeue interval while an available robot is short of work
pub const BELOW_MIN_REQUEUE: Duration = Duration::from_secs(30);

/// Each auction offers roughly this many orders per robot that could
/// take work, leaving the winner selection a margin to optimise in
pub const ORDERS_PER_NEEDY_ROBOT: i64 = 3;
