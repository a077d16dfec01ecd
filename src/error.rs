//! Error types for the auction control-plane

use std::fmt;

/// Errors that can occur across the control loops
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Record with this name does not exist in the store
    NotFound { kind: &'static str, name: String },
    /// Record with this name already exists in the store
    AlreadyExists { kind: &'static str, name: String },
    /// Optimistic-concurrency write lost against a newer generation
    Conflict {
        kind: &'static str,
        name: String,
        expected: u64,
        observed: u64,
    },
    /// Input record failed validation
    ValidationError(String),
    /// Required configuration is missing or malformed
    ConfigurationError(String),
    /// Path-planner HTTP interface error
    PlannerError(String),
    /// Request the path-planner understood but rejected
    PlannerDenied { code: String, message: String },
    /// Store-level I/O error
    StoreError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound { kind, name } => write!(f, "{} {:?} not found", kind, name),
            Error::AlreadyExists { kind, name } => {
                write!(f, "{} {:?} already exists", kind, name)
            }
            Error::Conflict {
                kind,
                name,
                expected,
                observed,
            } => write!(
                f,
                "conflict writing {} {:?}: expected generation {}, store has {}",
                kind, name, expected, observed
            ),
            Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
            Error::ConfigurationError(msg) => write!(f, "configuration error: {}", msg),
            Error::PlannerError(msg) => write!(f, "path-planner error: {}", msg),
            Error::PlannerDenied { code, message } => {
                write!(f, "path-planner rejected request ({}): {}", code, message)
            }
            Error::StoreError(msg) => write!(f, "store error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Conflicts are expected under concurrent writers and resolved by
    /// re-reconciling with fresh state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}
