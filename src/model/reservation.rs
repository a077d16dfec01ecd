//! Order reservation record

use super::meta::Meta;
use super::order::OrderData;
use super::scope::Scope;
use crate::store::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A request to the order manager to hold N warehouse orders out of the
/// normal dispatch flow pending auction resolution. Created by the
/// auctioneer, filled and completed by the order manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub meta: Meta,
    pub spec: ReservationSpec,
    #[serde(default)]
    pub status: ReservationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationSpec {
    pub request: OrderRequest,
    /// Auction result written back by the auctioneer; the order manager
    /// commits these to the warehouse-management system
    #[serde(default)]
    pub assignments: Vec<OrderAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub scope: Scope,
    pub quantity: i64,
}

/// One (warehouse-order, robot) pair of the auction result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAssignment {
    pub warehouse: String,
    pub order_id: String,
    pub robot: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReservationStatus {
    #[serde(default)]
    pub warehouse_orders: Vec<OrderData>,
    #[serde(default)]
    pub assignments: Vec<OrderAssignment>,
    pub state: ReservationState,
    #[serde(default)]
    pub message: String,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReservationState {
    #[default]
    #[serde(rename = "NEW")]
    New,
    #[serde(rename = "ACCEPTED")]
    Accepted,
    #[serde(rename = "RESERVATIONS")]
    Reservations,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "TIMEOUT")]
    Timeout,
}

impl Record for Reservation {
    const KIND: &'static str = "Reservation";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}
