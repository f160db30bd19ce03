//! KvStore - async string-keyed value persistence
//!
//! Values round-trip as opaque JSON documents. Two backends are provided:
//!
//! - [`MemoryStore`] - process-local map, used by tests and ephemeral sessions
//! - [`FileStore`] - a single JSON object on disk, written atomically under an
//!   exclusive file lock
//!
//! Callers that want typed access use [`KvStoreExt`], which is implemented for
//! every [`KvStore`] (including `dyn KvStore`).

mod error;
mod file;
mod memory;
mod store;

pub use error::KvError;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{KvStore, KvStoreExt};
