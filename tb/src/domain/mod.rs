//! Domain types for TaskBoard
//!
//! Core domain types: Project and Task, plus the creation/patch payloads the
//! state store accepts. Serialized field names are camelCase so persisted
//! documents keep the shape the desktop app has always written.

use serde::{Deserialize, Deserializer};

mod id;
mod priority;
mod project;
mod task;

pub use id::{IdResolver, generate_id};
pub use priority::Priority;
pub use project::{NewProject, Project, ProjectPatch, ProjectStatus};
pub use task::{NewTask, Task, TaskPatch, TaskStatus};

/// Treat `""` the same as a missing value
///
/// Older documents store an unselected project or repository as the empty
/// string rather than omitting it.
pub(crate) fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
