//! Record store abstractions
//!
//! The control loops never call each other; they communicate through
//! versioned records in a shared declarative store that supports typed
//! list/get/watch, optimistic-concurrency writes and cascading delete
//! along controller references. The production store is an external
//! collaborator; [`MemoryStore`] implements the same contract in-process
//! for tests and the simulation runner.

pub mod memory;

pub use memory::MemoryStore;

use crate::model::Meta;

/// A versioned record kind the store can hold
pub trait Record: Clone + std::fmt::Debug + Send + Sync + 'static {
    const KIND: &'static str;

    fn meta(&self) -> &Meta;
    fn meta_mut(&mut self) -> &mut Meta;

    fn name(&self) -> &str {
        &self.meta().name
    }
}

/// Watch notification for one record kind
#[derive(Debug, Clone)]
pub enum StoreEvent<R: Record> {
    /// Record was created or updated; carries the new state
    Applied(R),
    /// Record was deleted; carries the last state
    Deleted(R),
}

impl<R: Record> StoreEvent<R> {
    pub fn record(&self) -> &R {
        match self {
            StoreEvent::Applied(r) | StoreEvent::Deleted(r) => r,
        }
    }
}
