//! Taskboard - projects and tasks on a three-column board
//!
//! Tasks live in three ordered buckets (todo, in progress, completed); a
//! task's status always names the bucket holding it. All board state is
//! owned by a single [`StateManager`] actor which applies each mutation in
//! memory, saves the board through a [`kvstore::KvStore`] and then notifies
//! subscribers.
//!
//! # Modules
//!
//! - [`domain`] - Projects, tasks, priorities and ID helpers
//! - [`state`] - Snapshot, bucket moves and the state store actor
//! - [`board`] - Input validation and user notifications over the store
//! - [`notify`] - Notification sinks
//! - [`github`] - Repository listing for project links
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod board;
pub mod cli;
pub mod config;
pub mod domain;
pub mod github;
pub mod notify;
pub mod state;

// Re-export commonly used types
pub use board::{Board, BoardError, BoardResult, GITHUB_TOKEN_KEY};
pub use config::{Config, GitHubConfig, StorageConfig};
pub use domain::{
    IdResolver, NewProject, NewTask, Priority, Project, ProjectPatch, ProjectStatus, Task, TaskPatch, TaskStatus,
    generate_id,
};
pub use github::{GitHubClient, GitHubError, RepoSource, Repository};
pub use notify::{ConsoleNotifier, LogNotifier, Notice, Notifier};
pub use state::{
    InvariantViolation, LoadState, PROJECTS_KEY, Snapshot, StateError, StateEvent, StateManager, Subscription,
    TASKS_KEY, TaskBuckets, TaskMove,
};
