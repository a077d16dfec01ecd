//! # warebid - warehouse order auction control-plane
//!
//! warebid dispatches warehouse orders to a fleet of mobile robots with a
//! sealed-bid auction over predicted travel times. Three loosely-coupled
//! control loops cooperate exclusively through versioned records in a
//! shared, watched object store:
//!
//! - the warehouse-wide **auctioneer** solicits order reservations,
//!   opens one auction per robot, selects winners and commits the
//!   assignments back to the order manager,
//! - the per-robot **bid agent** answers auction invitations with a
//!   bidding vector before the deadline,
//! - the per-robot **travel-time estimator** produces the numeric cost
//!   evidence by consulting the robot's path-planner, precomputing
//!   missing paths while the robot is idle.
//!
//! ## Modules
//!
//! - [`model`] - domain records and their spec/status halves
//! - [`store`] - record store contract and in-memory implementation
//! - [`reconcile`] - level-triggered reconciler runner
//! - [`auctioneer`] - auction lifecycle and winner selection
//! - [`bidagent`] - bid construction per robot
//! - [`estimator`] - travel-time estimation and path precomputation
//! - [`planner`] - path-planner HTTP interface
//! - [`admission`] - configuration admission checks
//! - [`error`] - error types
//! - [`config`] - environment-variable configuration
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use warebid::auctioneer::AuctioneerController;
//! use warebid::reconcile::Runner;
//! use warebid::store::MemoryStore;
//!
//! # async fn start() {
//! let store = MemoryStore::new();
//! let controller = AuctioneerController::new(store.clone(), vec!["robot-a".to_string()]);
//! let runner = Runner::new(controller, 4);
//! let handle = runner.handle();
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let watches = warebid::auctioneer::spawn_auctioneer_watches(
//!     store,
//!     handle,
//!     ["robot-a".to_string()].into_iter().collect(),
//! );
//! runner.run(shutdown_rx).await;
//! # drop(watches);
//! # }
//! ```

pub mod admission;
pub mod auctioneer;
pub mod bidagent;
pub mod config;
pub mod error;
pub mod estimator;
pub mod logger;
pub mod model;
pub mod planner;
pub mod reconcile;
pub mod store;
pub mod utils;

pub use error::Error;
pub use model::*;
pub use store::{MemoryStore, Record, StoreEvent};
