//! Board - application layer over the state store
//!
//! Validates user input, resolves partial IDs and reports successful changes
//! through a [`Notifier`]. The state store itself never notifies the user.

use std::collections::HashMap;
use std::sync::Arc;

use kvstore::{KvError, KvStore, KvStoreExt};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{IdResolver, NewProject, NewTask, Project, ProjectPatch, Task, TaskPatch, TaskStatus};
use crate::notify::{Notice, Notifier};
use crate::state::{Snapshot, StateError, StateManager, TaskMove};

/// Key holding the GitHub access token
pub const GITHUB_TOKEN_KEY: &str = "github-token";

/// Errors from board operations
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No {kind} matches '{reference}'")]
    NotFound { kind: &'static str, reference: String },

    #[error("'{reference}' matches several {kind}s: {}", candidates.join(", "))]
    Ambiguous {
        kind: &'static str,
        reference: String,
        candidates: Vec<String>,
    },

    #[error("Board could not be loaded ({0}); refusing to overwrite the stored board")]
    LoadFailed(String),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Store error: {0}")]
    Store(#[from] KvError),
}

pub type BoardResult<T> = Result<T, BoardError>;

/// Project/task board with notifications
#[derive(Clone)]
pub struct Board {
    state: StateManager,
    store: Arc<dyn KvStore>,
    notifier: Arc<dyn Notifier>,
}

impl Board {
    /// Spawn a state manager over `store` and wrap it
    pub fn open(store: Arc<dyn KvStore>, notifier: Arc<dyn Notifier>) -> Self {
        debug!("Board::open: called");
        let state = StateManager::spawn(Arc::clone(&store));
        Self::new(state, store, notifier)
    }

    pub fn new(state: StateManager, store: Arc<dyn KvStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { state, store, notifier }
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    /// Wait for the persisted board to be loaded
    ///
    /// Succeeds even if the load failed; mutations then fail with
    /// [`BoardError::LoadFailed`] instead.
    pub async fn ready(&self) -> BoardResult<()> {
        self.state.wait_loaded().await?;
        Ok(())
    }

    /// Fail if the board in memory is an empty stand-in for one that could not be read
    pub fn ensure_loaded(&self) -> BoardResult<()> {
        match self.state.load_error() {
            Some(error) => Err(BoardError::LoadFailed(error)),
            None => Ok(()),
        }
    }

    // === Projects ===

    pub async fn add_project(&self, mut project: NewProject) -> BoardResult<Project> {
        debug!(name = %project.name, "Board::add_project: called");
        self.ensure_loaded()?;
        project.name = required("Project name", &project.name)?;
        if let Some(repo) = &project.github_repo {
            project.github_repo = Some(validate_repo(repo)?);
        }

        let created = self.state.add_project(project).await?;
        info!(id = %created.id, name = %created.name, "Created project");
        self.notifier.notify(&Notice::project_created(&created.name));
        Ok(created)
    }

    pub async fn update_project(&self, id: &str, mut patch: ProjectPatch) -> BoardResult<Project> {
        debug!(%id, ?patch, "Board::update_project: called");
        self.ensure_loaded()?;
        if let Some(name) = &patch.name {
            patch.name = Some(required("Project name", name)?);
        }
        if let Some(Some(repo)) = &patch.github_repo {
            patch.github_repo = Some(Some(validate_repo(repo)?));
        }

        let updated = self
            .state
            .update_project(id, patch)
            .await?
            .ok_or_else(|| not_found("project", id))?;
        self.notifier.notify(&Notice::project_updated(&updated.name));
        Ok(updated)
    }

    /// Delete a project; its tasks are left on the board
    pub async fn delete_project(&self, id: &str) -> BoardResult<()> {
        debug!(%id, "Board::delete_project: called");
        self.ensure_loaded()?;
        if !self.state.delete_project(id).await? {
            return Err(not_found("project", id));
        }
        info!(%id, "Deleted project");
        self.notifier.notify(&Notice::project_deleted());
        Ok(())
    }

    /// Link a project to a GitHub repository given as `owner/name`
    pub async fn link_repository(&self, project_id: &str, repo: &str) -> BoardResult<Project> {
        debug!(%project_id, %repo, "Board::link_repository: called");
        self.ensure_loaded()?;
        let repo = validate_repo(repo)?;
        let updated = self
            .state
            .update_project(project_id, ProjectPatch::new().with_github_repo(repo.clone()))
            .await?
            .ok_or_else(|| not_found("project", project_id))?;
        self.notifier.notify(&Notice::repository_linked(&updated.name, &repo));
        Ok(updated)
    }

    pub async fn unlink_repository(&self, project_id: &str) -> BoardResult<Project> {
        debug!(%project_id, "Board::unlink_repository: called");
        self.ensure_loaded()?;
        let updated = self
            .state
            .update_project(project_id, ProjectPatch::new().clear_github_repo())
            .await?
            .ok_or_else(|| not_found("project", project_id))?;
        self.notifier.notify(&Notice::repository_unlinked(&updated.name));
        Ok(updated)
    }

    // === Tasks ===

    pub async fn add_task(&self, mut task: NewTask) -> BoardResult<Task> {
        debug!(title = %task.title, "Board::add_task: called");
        self.ensure_loaded()?;
        task.title = required("Task title", &task.title)?;

        let created = self.state.add_task(task).await?;
        info!(id = %created.id, status = %created.status, "Created task");
        self.notifier.notify(&Notice::task_created(&created.title));
        Ok(created)
    }

    pub async fn update_task(&self, id: &str, mut patch: TaskPatch) -> BoardResult<Task> {
        debug!(%id, ?patch, "Board::update_task: called");
        self.ensure_loaded()?;
        if let Some(title) = &patch.title {
            patch.title = Some(required("Task title", title)?);
        }

        let updated = self
            .state
            .update_task(id, patch)
            .await?
            .ok_or_else(|| not_found("task", id))?;
        self.notifier.notify(&Notice::task_updated(&updated.title));
        Ok(updated)
    }

    /// Move a task to position `index` of bucket `to` (`None` appends)
    ///
    /// Returns false when the task was already at that position.
    pub async fn move_task(&self, id: &str, to: TaskStatus, index: Option<usize>) -> BoardResult<bool> {
        debug!(%id, %to, ?index, "Board::move_task: called");
        self.ensure_loaded()?;
        let (from, title) = self
            .state
            .with_snapshot(|s| s.tasks.locate(id).zip(s.task(id).map(|t| t.title.clone())))
            .map(|((status, _), title)| (status, title))
            .ok_or_else(|| not_found("task", id))?;

        let moved = self.state.move_task_to(id, from, to, index).await?;
        if moved {
            self.notifier.notify(&Notice::task_moved(&title, to.label()));
        }
        Ok(moved)
    }

    /// Apply a drag-and-drop gesture; false if nothing moved
    pub async fn reorder(&self, mv: TaskMove) -> BoardResult<bool> {
        debug!(?mv, "Board::reorder: called");
        self.ensure_loaded()?;
        let title = self
            .state
            .with_snapshot(|s| s.tasks.bucket(mv.source).get(mv.source_index).map(|t| t.title.clone()));

        let moved = self.state.reorder(mv).await?;
        if let Some(title) = title.filter(|_| moved) {
            self.notifier.notify(&Notice::task_moved(&title, mv.destination.label()));
        }
        Ok(moved)
    }

    pub async fn delete_task(&self, id: &str) -> BoardResult<()> {
        debug!(%id, "Board::delete_task: called");
        self.ensure_loaded()?;
        if !self.state.delete_task(id).await? {
            return Err(not_found("task", id));
        }
        info!(%id, "Deleted task");
        self.notifier.notify(&Notice::task_deleted());
        Ok(())
    }

    // === Resolution ===

    /// Map a partial project ID or exact name to a full project ID
    pub fn resolve_project(&self, reference: &str) -> BoardResult<String> {
        let names: HashMap<String, String> = self
            .state
            .with_snapshot(|s| s.projects.iter().map(|p| (p.id.clone(), p.name.clone())).collect());
        resolve("project", &names, reference)
    }

    /// Map a partial task ID or exact title to a full task ID
    pub fn resolve_task(&self, reference: &str) -> BoardResult<String> {
        let titles: HashMap<String, String> = self
            .state
            .with_snapshot(|s| s.tasks.iter().map(|t| (t.id.clone(), t.title.clone())).collect());
        resolve("task", &titles, reference)
    }

    // === GitHub credential ===

    /// Store the GitHub access token
    pub async fn set_github_token(&self, token: &str) -> BoardResult<()> {
        debug!("Board::set_github_token: called");
        let token = required("GitHub token", token)?;
        self.store.set_as(GITHUB_TOKEN_KEY, &token).await?;
        info!("Stored GitHub token");
        Ok(())
    }

    pub async fn github_token(&self) -> BoardResult<Option<String>> {
        debug!("Board::github_token: called");
        Ok(self.store.get_as(GITHUB_TOKEN_KEY).await?)
    }
}

fn required(field: &str, value: &str) -> BoardResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BoardError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Check that `repo` looks like `owner/name`
pub fn validate_repo(repo: &str) -> BoardResult<String> {
    let repo = repo.trim();
    let valid = repo
        .split_once('/')
        .is_some_and(|(owner, name)| is_repo_part(owner) && is_repo_part(name));
    if !valid {
        return Err(BoardError::InvalidInput(format!(
            "Repository '{}' is not of the form owner/name",
            repo
        )));
    }
    Ok(repo.to_string())
}

fn is_repo_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn not_found(kind: &'static str, reference: &str) -> BoardError {
    BoardError::NotFound {
        kind,
        reference: reference.to_string(),
    }
}

fn resolve(kind: &'static str, names: &HashMap<String, String>, reference: &str) -> BoardResult<String> {
    match IdResolver::new(names).resolve(reference) {
        Ok(Some(id)) => Ok(id),
        Ok(None) => Err(not_found(kind, reference)),
        Err(candidates) => Err(BoardError::Ambiguous {
            kind,
            reference: reference.to_string(),
            candidates,
        }),
    }
}
