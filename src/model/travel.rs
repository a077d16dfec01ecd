//! Travel-time calculation request/result record
//!
//! The request (spec) is written by the bid agent, the result (status) by
//! the travel-time estimator; both share one record owned by the auction
//! that caused it.

use super::meta::Meta;
use crate::store::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelTimeCalculation {
    pub meta: Meta,
    pub spec: TravelTimeSpec,
    #[serde(default)]
    pub status: TravelTimeResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelTimeSpec {
    /// Estimated position of the robot when it would begin the first task
    pub start_position: String,
    pub paths: Vec<PathKey>,
    /// Absolute deadline the estimator obeys for all polling loops
    pub valid_until: DateTime<Utc>,
}

/// A (start, goal) position pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathKey {
    pub start: String,
    pub goal: String,
}

impl PathKey {
    pub fn new(start: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            goal: goal.into(),
        }
    }
}

impl std::fmt::Display for PathKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.start, self.goal)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TravelTimeResult {
    #[serde(default)]
    pub run_times: Vec<RunTime>,
    pub state: TravelTimeState,
}

/// Reported travel time of one path in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTime {
    pub start: String,
    pub goal: String,
    pub seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TravelTimeState {
    #[default]
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "PROCESSED")]
    Processed,
}

impl Record for TravelTimeCalculation {
    const KIND: &'static str = "TravelTimeCalculation";

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}
