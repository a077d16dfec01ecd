//! Auctioneer configuration record

use super::meta::Meta;
use super::scope::Scope;
use crate::store::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One auctioneer's scope and dispatch policy. Long-lived, operator owned;
/// edits trigger reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctioneerConfig {
    pub meta: Meta,
    pub spec: AuctioneerSpec,
    #[serde(default)]
    pub status: AuctioneerStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctioneerSpec {
    pub scope: Scope,
    pub policy: AuctionPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionPolicy {
    pub max_orders_per_robot: i64,
    pub min_orders_per_robot: i64,
    pub min_orders_per_auction: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuctioneerStatus {
    pub robots_in_scope: Vec<String>,
    pub available_robots: Vec<String>,
    pub warehouse_orders_in_process: i64,
    pub running_auctions: i64,
    pub state: AuctioneerState,
    #[serde(default)]
    pub message: String,
    pub last_state_change_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

/// Coarse state reported on the auctioneer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuctioneerState {
    #[default]
    #[serde(rename = "WATCHING")]
    Watching,
    #[serde(rename = "WAITING")]
    Waiting,
    #[serde(rename = "AUCTION")]
    Auction,
    #[serde(rename = "ERROR")]
    Error,
}

impl AuctioneerConfig {
    pub fn new(name: impl Into<String>, scope: Scope, policy: AuctionPolicy) -> Self {
        Self {
            meta: Meta::new(name),
            spec: AuctioneerSpec { scope, policy },
            status: AuctioneerStatus::default(),
        }
    }
}

impl Record for AuctioneerConfig {
    const KIND: &'static str = "AuctioneerConfig";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}
