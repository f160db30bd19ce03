//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{NewProject, NewTask, Project, ProjectPatch, Task, TaskPatch, TaskStatus};

use super::snapshot::TaskMove;

/// Errors from state operations
///
/// Persistence failures never surface here; they are logged and broadcast as
/// [`StateEvent`](super::StateEvent)s while the in-memory change stands.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Channel error")]
    ChannelError,

    #[error("State manager stopped before initial load finished")]
    LoadAborted,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Project operations
    AddProject {
        project: NewProject,
        reply: oneshot::Sender<Project>,
    },
    UpdateProject {
        id: String,
        patch: ProjectPatch,
        reply: oneshot::Sender<Option<Project>>,
    },
    DeleteProject {
        id: String,
        reply: oneshot::Sender<bool>,
    },

    // Task operations
    AddTask {
        task: NewTask,
        reply: oneshot::Sender<Task>,
    },
    UpdateTask {
        id: String,
        patch: TaskPatch,
        reply: oneshot::Sender<Option<Task>>,
    },
    MoveTask {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
        index: Option<usize>,
        reply: oneshot::Sender<bool>,
    },
    Reorder {
        mv: TaskMove,
        reply: oneshot::Sender<bool>,
    },
    DeleteTask {
        id: String,
        reply: oneshot::Sender<bool>,
    },

    // Shutdown
    Shutdown,
}
