//! Project domain type

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::empty_string_as_none;
use super::id::generate_id;

/// Project lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    NotStarted,
    #[default]
    InProgress,
    Completed,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Unknown project status: {}", s)),
        }
    }
}

/// A tracked project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique identifier, assigned by the store
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Free-form project category ("web", "cli", ...)
    #[serde(default)]
    pub r#type: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub status: ProjectStatus,

    /// Linked GitHub repository as `owner/name`
    #[serde(default, deserialize_with = "empty_string_as_none", skip_serializing_if = "Option::is_none")]
    pub github_repo: Option<String>,

    /// Embedded task summaries written by older versions
    ///
    /// Read-only: the bucketed task collection is the source of truth for
    /// a project's tasks.
    #[serde(default)]
    tasks: Vec<Value>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Build a new project from caller-supplied fields
    ///
    /// `created_at` and `updated_at` are both set to `now`.
    pub fn from_new(new: NewProject, now: DateTime<Utc>) -> Self {
        debug!(name = %new.name, "Project::from_new: called");
        Self {
            id: generate_id("proj"),
            name: new.name,
            r#type: new.r#type,
            description: new.description,
            status: new.status.unwrap_or_default(),
            github_repo: new.github_repo,
            tasks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Embedded task summaries carried over from older documents
    pub fn legacy_tasks(&self) -> &[Value] {
        &self.tasks
    }

    /// Shallow-merge `patch` into this project and bump `updated_at`
    pub fn apply(&mut self, patch: &ProjectPatch, now: DateTime<Utc>) {
        debug!(id = %self.id, "Project::apply: called");
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(r#type) = &patch.r#type {
            self.r#type = r#type.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(github_repo) = &patch.github_repo {
            self.github_repo = github_repo.clone();
        }
        self.touch(now);
    }

    /// Refresh `updated_at`, keeping it strictly increasing
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = if now > self.updated_at {
            now
        } else {
            debug!(id = %self.id, "Project::touch: clock did not advance, nudging updated_at");
            self.updated_at + Duration::milliseconds(1)
        };
    }
}

/// Fields supplied when creating a project
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProject {
    pub name: String,
    pub r#type: String,
    pub description: String,
    /// Overrides the default `in_progress` status
    pub status: Option<ProjectStatus>,
    pub github_repo: Option<String>,
}

impl NewProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, r#type: impl Into<String>) -> Self {
        self.r#type = r#type.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_status(mut self, status: ProjectStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_github_repo(mut self, repo: impl Into<String>) -> Self {
        self.github_repo = Some(repo.into());
        self
    }
}

/// Shallow-merge update for a project; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub r#type: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    /// `Some(None)` clears the linked repository
    pub github_repo: Option<Option<String>>,
}

impl ProjectPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, r#type: impl Into<String>) -> Self {
        self.r#type = Some(r#type.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: ProjectStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_github_repo(mut self, repo: impl Into<String>) -> Self {
        self.github_repo = Some(Some(repo.into()));
        self
    }

    pub fn clear_github_repo(mut self) -> Self {
        self.github_repo = Some(None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.r#type.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.github_repo.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_new_defaults() {
        let now = Utc::now();
        let project = Project::from_new(NewProject::new("Website"), now);

        assert!(project.id.starts_with("proj-"));
        assert_eq!(project.name, "Website");
        assert_eq!(project.status, ProjectStatus::InProgress);
        assert!(project.legacy_tasks().is_empty());
        assert_eq!(project.created_at, project.updated_at);
        assert!(project.github_repo.is_none());
    }

    #[test]
    fn test_from_new_caller_fields_win() {
        let new = NewProject::new("CLI")
            .with_type("tool")
            .with_status(ProjectStatus::NotStarted)
            .with_github_repo("octo/cli");
        let project = Project::from_new(new, Utc::now());

        assert_eq!(project.r#type, "tool");
        assert_eq!(project.status, ProjectStatus::NotStarted);
        assert_eq!(project.github_repo.as_deref(), Some("octo/cli"));
    }

    #[test]
    fn test_apply_only_touches_supplied_fields() {
        let now = Utc::now();
        let mut project = Project::from_new(NewProject::new("Docs").with_description("user guide"), now);
        let before = project.clone();

        project.apply(&ProjectPatch::new().with_status(ProjectStatus::Completed), now);

        assert_eq!(project.status, ProjectStatus::Completed);
        assert_eq!(project.name, before.name);
        assert_eq!(project.description, before.description);
        assert_eq!(project.created_at, before.created_at);
        assert!(project.updated_at > before.updated_at);
    }

    #[test]
    fn test_apply_clears_repo() {
        let now = Utc::now();
        let mut project = Project::from_new(NewProject::new("Docs").with_github_repo("octo/docs"), now);
        project.apply(&ProjectPatch::new().clear_github_repo(), now);
        assert!(project.github_repo.is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let project = Project::from_new(NewProject::new("Website").with_github_repo("octo/site"), Utc::now());
        let value = serde_json::to_value(&project).unwrap();

        assert_eq!(value["status"], json!("in_progress"));
        assert_eq!(value["githubRepo"], json!("octo/site"));
        assert_eq!(value["tasks"], json!([]));
        assert!(value.get("createdAt").is_some());
        assert!(value.get("updatedAt").is_some());
        assert!(value.get("type").is_some());
    }

    #[test]
    fn test_deserialize_legacy_document() {
        let value = json!({
            "id": "k2j3h4g5f",
            "name": "Legacy",
            "githubRepo": "",
            "tasks": [{"id": "t1", "status": "completed"}],
            "createdAt": "2024-03-01T10:00:00.000Z",
            "updatedAt": "2024-03-02T10:00:00.000Z"
        });
        let project: Project = serde_json::from_value(value).unwrap();

        assert_eq!(project.id, "k2j3h4g5f");
        assert!(project.github_repo.is_none());
        assert_eq!(project.status, ProjectStatus::InProgress);
        assert_eq!(project.legacy_tasks().len(), 1);
        assert_eq!(project.description, "");
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("not-started".parse::<ProjectStatus>().unwrap(), ProjectStatus::NotStarted);
        assert_eq!("IN_PROGRESS".parse::<ProjectStatus>().unwrap(), ProjectStatus::InProgress);
        assert!("archived".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(ProjectPatch::new().is_empty());
        assert!(!ProjectPatch::new().clear_github_repo().is_empty());
    }
}
