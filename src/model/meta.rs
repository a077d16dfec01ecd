//! Record metadata shared by all entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Label key naming the robot a record belongs to
pub const ROBOT_LABEL: &str = "robot-name";

/// Label key tying reservations, auctions and travel-time requests of one
/// auction round together
pub const AUCTION_LABEL: &str = "order-auction";

/// Reference from a record to the record controlling its lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
    pub uid: Uuid,
}

/// Metadata of a versioned record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub name: String,
    pub namespace: String,
    pub uid: Uuid,
    /// Bumped by the store on every successful write; writes carrying a
    /// stale generation are rejected as conflicts.
    pub generation: u64,
    pub creation_time: DateTime<Utc>,
    pub labels: BTreeMap<String, String>,
    /// Controller back-edge; the store cascades deletion along it
    pub owner: Option<OwnerRef>,
}

impl Meta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: "default".to_string(),
            uid: Uuid::nil(),
            generation: 0,
            creation_time: Utc::now(),
            labels: BTreeMap::new(),
            owner: None,
        }
    }

    pub fn with_label(mut self, key: &str, value: impl Into<String>) -> Self {
        self.labels.insert(key.to_string(), value.into());
        self
    }

    pub fn controlled_by(mut self, kind: &str, owner: &Meta) -> Self {
        self.owner = Some(OwnerRef {
            kind: kind.to_string(),
            name: owner.name.clone(),
            uid: owner.uid,
        });
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Robot name from the robot label, empty when unlabelled
    pub fn robot(&self) -> &str {
        self.label(ROBOT_LABEL).unwrap_or("")
    }

    /// Auction round id from the auction label, empty when unlabelled
    pub fn auction_id(&self) -> &str {
        self.label(AUCTION_LABEL).unwrap_or("")
    }
}
