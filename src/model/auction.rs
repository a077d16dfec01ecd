//! Order auction record

use super::meta::Meta;
use super::order::OrderData;
use crate::store::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One robot's invitation to bid on the warehouse orders of one
/// reservation. The auctioneer owns the spec, the robot's bid agent owns
/// the status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub meta: Meta,
    pub spec: AuctionSpec,
    #[serde(default)]
    pub status: AuctionBid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionSpec {
    /// Order set fixed at auction-open time; membership is immutable
    pub warehouse_orders: Vec<OrderData>,
    /// Auction deadline; the bid agent starts closing ahead of it
    pub valid_until: DateTime<Utc>,
    pub auction_state: AuctionState,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuctionBid {
    pub bid_state: BidState,
    #[serde(default)]
    pub biddings: Vec<OrderBidding>,
}

/// A non-negative number per warehouse order, lower = more preferred,
/// conventionally seconds of expected travel time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBidding {
    pub warehouse: String,
    pub order_id: String,
    pub bidding: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuctionState {
    #[default]
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "CLOSED")]
    Closed,
    #[serde(rename = "COMPLETED")]
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BidState {
    #[default]
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl Record for Auction {
    const KIND: &'static str = "Auction";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}
