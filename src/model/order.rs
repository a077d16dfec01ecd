//! Warehouse orders and their transport tasks

use super::meta::Meta;
use crate::store::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of one warehouse order as carried inside reservations and
/// auction invitations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderData {
    pub warehouse: String,
    pub order_id: String,
    /// Latest start date; orders whose date is already in the past are
    /// overdue and prioritised at auction close
    pub latest_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tasks: Vec<OrderTask>,
}

/// One transport task inside a warehouse order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTask {
    pub task_id: String,
    pub source_bin: String,
    pub dest_bin: String,
}

impl OrderData {
    pub fn new(warehouse: impl Into<String>, order_id: impl Into<String>) -> Self {
        Self {
            warehouse: warehouse.into(),
            order_id: order_id.into(),
            latest_start: None,
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task_id: &str, source_bin: &str, dest_bin: &str) -> Self {
        self.tasks.push(OrderTask {
            task_id: task_id.to_string(),
            source_bin: source_bin.to_string(),
            dest_bin: dest_bin.to_string(),
        });
        self
    }

    /// True when the latest start date exists and lies in the past
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.latest_start {
            Some(lsd) => lsd < now,
            None => false,
        }
    }
}

/// One executable transport unit, labelled with its owner robot when
/// assigned. Externally managed; this system only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseOrder {
    pub meta: Meta,
    pub spec: WarehouseOrderSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseOrderSpec {
    pub data: OrderData,
    pub order_status: OrderStatus,
    /// Processing sequence on the assigned robot, higher = later
    #[serde(default)]
    pub sequence: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "PROCESSED")]
    Processed,
}

impl Record for WarehouseOrder {
    const KIND: &'static str = "WarehouseOrder";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}
