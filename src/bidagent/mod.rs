//! Per-robot bid agent
//!
//! Watches auction invitations addressed to this robot. For each open
//! auction it estimates the robot's near-future start position, files a
//! travel-time calculation request and synthesises a bidding vector
//! before the auction deadline. The agent exposes no RPC; its only
//! observable effect is the bid written onto the auction status.

pub mod controller;
pub mod watches;

pub use controller::BidAgentController;
pub use watches::spawn_bid_agent_watches;

/// The agent starts closing its bid this long before the auction deadline
pub const BID_BUFFER: chrono::Duration = chrono::Duration::seconds(20);

/// The travel-time request deadline sits this far before the bid close
pub const REQUEST_BUFFER: chrono::Duration = chrono::Duration::seconds(10);
