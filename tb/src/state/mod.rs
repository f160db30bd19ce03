//! State management with actor pattern
//!
//! StateManager owns the board snapshot and processes mutations via channels,
//! saving each change through a [`kvstore::KvStore`] before notifying
//! subscribers.

mod listeners;
mod manager;
mod messages;
mod snapshot;

pub use listeners::{Listener, Subscription};
pub use manager::{LoadState, PROJECTS_KEY, StateEvent, StateManager, TASKS_KEY};
pub use messages::{StateCommand, StateError, StateResponse};
pub use snapshot::{InvariantViolation, Snapshot, TaskBuckets, TaskMove};
