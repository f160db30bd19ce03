//! Snapshot - the complete in-memory board state
//!
//! Mutations here are pure and synchronous. Each one reports whether it
//! changed anything so the manager can skip persistence and notification for
//! no-ops. After every mutation a task lives in exactly one bucket and its
//! `status` equals that bucket's key.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{NewProject, NewTask, Project, ProjectPatch, Task, TaskPatch, TaskStatus};

/// A broken bucket invariant found by [`Snapshot::check_invariants`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("task {id} has status {status} but lives in bucket {bucket}")]
    StatusMismatch {
        id: String,
        status: TaskStatus,
        bucket: TaskStatus,
    },

    #[error("task {id} appears more than once")]
    DuplicateId { id: String },
}

/// Tasks partitioned into ordered buckets keyed by status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskBuckets {
    #[serde(default)]
    pub todo: Vec<Task>,
    #[serde(default, rename = "inProgress")]
    pub in_progress: Vec<Task>,
    #[serde(default)]
    pub completed: Vec<Task>,
}

impl TaskBuckets {
    pub fn bucket(&self, status: TaskStatus) -> &[Task] {
        match status {
            TaskStatus::Todo => &self.todo,
            TaskStatus::InProgress => &self.in_progress,
            TaskStatus::Completed => &self.completed,
        }
    }

    fn bucket_mut(&mut self, status: TaskStatus) -> &mut Vec<Task> {
        match status {
            TaskStatus::Todo => &mut self.todo,
            TaskStatus::InProgress => &mut self.in_progress,
            TaskStatus::Completed => &mut self.completed,
        }
    }

    /// All tasks, bucket by bucket in display order
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        TaskStatus::ALL.into_iter().flat_map(move |status| self.bucket(status).iter())
    }

    pub fn len(&self) -> usize {
        self.todo.len() + self.in_progress.len() + self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bucket and index of the task with `id`
    pub fn locate(&self, id: &str) -> Option<(TaskStatus, usize)> {
        TaskStatus::ALL.into_iter().find_map(|status| {
            self.bucket(status)
                .iter()
                .position(|t| t.id == id)
                .map(|index| (status, index))
        })
    }
}

/// A reorder gesture: take the task at `source_index` in `source` and drop it
/// at `destination_index` in `destination`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskMove {
    pub source: TaskStatus,
    pub source_index: usize,
    pub destination: TaskStatus,
    pub destination_index: usize,
}

/// The complete board state at a point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub tasks: TaskBuckets,
}

impl Snapshot {
    pub fn new(projects: Vec<Project>, tasks: TaskBuckets) -> Self {
        Self { projects, tasks }
    }

    // === Reads ===

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.locate(id).map(|(status, index)| &self.tasks.bucket(status)[index])
    }

    /// Tasks referencing `project_id`, bucket by bucket in display order
    pub fn tasks_for_project(&self, project_id: &str) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.project_id.as_deref() == Some(project_id))
            .collect()
    }

    /// Percentage (0-100) of the project's tasks that are completed
    pub fn project_progress(&self, project_id: &str) -> f64 {
        let tasks = self.tasks_for_project(project_id);
        if tasks.is_empty() {
            return 0.0;
        }
        let completed = tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
        completed as f64 / tasks.len() as f64 * 100.0
    }

    /// Verify that every task id is unique and sits in the bucket its status names
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut seen = HashSet::new();
        for status in TaskStatus::ALL {
            for task in self.tasks.bucket(status) {
                if task.status != status {
                    return Err(InvariantViolation::StatusMismatch {
                        id: task.id.clone(),
                        status: task.status,
                        bucket: status,
                    });
                }
                if !seen.insert(task.id.as_str()) {
                    return Err(InvariantViolation::DuplicateId { id: task.id.clone() });
                }
            }
        }
        Ok(())
    }

    /// Repair documents written without the bucket invariant
    ///
    /// Rewrites each task's status to its bucket key and drops repeated ids,
    /// keeping the first occurrence. Returns the number of tasks touched.
    pub fn normalize(&mut self) -> usize {
        let mut seen = HashSet::new();
        let mut repaired = 0;
        for status in TaskStatus::ALL {
            self.tasks.bucket_mut(status).retain_mut(|task| {
                if !seen.insert(task.id.clone()) {
                    repaired += 1;
                    return false;
                }
                if task.status != status {
                    task.status = status;
                    repaired += 1;
                }
                true
            });
        }
        repaired
    }

    // === Project mutations ===

    /// Append a new project and return it
    pub fn add_project(&mut self, new: NewProject, now: DateTime<Utc>) -> Project {
        let project = Project::from_new(new, now);
        debug!(id = %project.id, "add_project: appending");
        self.projects.push(project.clone());
        project
    }

    /// Merge `patch` into the project with `id`; `None` when no such project
    pub fn update_project(&mut self, id: &str, patch: &ProjectPatch, now: DateTime<Utc>) -> Option<Project> {
        let Some(project) = self.projects.iter_mut().find(|p| p.id == id) else {
            debug!(%id, "update_project: no such project");
            return None;
        };
        project.apply(patch, now);
        Some(project.clone())
    }

    /// Remove the project with `id`; tasks referencing it are left alone
    pub fn delete_project(&mut self, id: &str) -> bool {
        let before = self.projects.len();
        self.projects.retain(|p| p.id != id);
        let removed = self.projects.len() != before;
        debug!(%id, removed, "delete_project: done");
        removed
    }

    // === Task mutations ===

    /// Append a new task to the bucket matching its status (default `todo`)
    pub fn add_task(&mut self, new: NewTask, now: DateTime<Utc>) -> Task {
        let task = Task::from_new(new, now);
        debug!(id = %task.id, status = %task.status, "add_task: appending");
        self.tasks.bucket_mut(task.status).push(task.clone());
        task
    }

    /// Merge `patch` into the task with `id`
    ///
    /// A status differing from the current bucket moves the task to the end
    /// of the matching bucket.
    pub fn update_task(&mut self, id: &str, patch: &TaskPatch) -> Option<Task> {
        let Some((status, index)) = self.tasks.locate(id) else {
            debug!(%id, "update_task: no such task");
            return None;
        };

        self.tasks.bucket_mut(status)[index].apply_fields(patch);

        match patch.status {
            Some(target) if target != status => {
                debug!(%id, from = %status, to = %target, "update_task: status changed, relocating");
                self.relocate(status, index, target, None);
                self.task(id).cloned()
            }
            _ => Some(self.tasks.bucket(status)[index].clone()),
        }
    }

    /// Move the task with `id` out of `from` and into `to`
    ///
    /// `index` is the position in the destination; `None` appends. Returns
    /// false when the task is not in `from` or would not actually move.
    pub fn move_task(&mut self, id: &str, from: TaskStatus, to: TaskStatus, index: Option<usize>) -> bool {
        let Some(source_index) = self.tasks.bucket(from).iter().position(|t| t.id == id) else {
            debug!(%id, %from, "move_task: task not in source bucket");
            return false;
        };
        self.relocate(from, source_index, to, index)
    }

    /// Apply a reorder gesture
    pub fn reorder(&mut self, mv: TaskMove) -> bool {
        if mv.source == mv.destination && mv.source_index == mv.destination_index {
            debug!(?mv, "reorder: dropped in place");
            return false;
        }
        self.relocate(mv.source, mv.source_index, mv.destination, Some(mv.destination_index))
    }

    /// Remove the task with `id` from whichever bucket holds it
    pub fn delete_task(&mut self, id: &str) -> bool {
        let Some((status, index)) = self.tasks.locate(id) else {
            debug!(%id, "delete_task: no such task");
            return false;
        };
        self.tasks.bucket_mut(status).remove(index);
        true
    }

    /// Remove the element at `from_index` of `from` and insert it into `to`
    ///
    /// The destination index is interpreted after removal and clamped to the
    /// bucket length; `None` means the end. The moved task's status is
    /// rewritten to `to`.
    fn relocate(&mut self, from: TaskStatus, from_index: usize, to: TaskStatus, to_index: Option<usize>) -> bool {
        if from_index >= self.tasks.bucket(from).len() {
            debug!(%from, from_index, "relocate: source index out of range");
            return false;
        }

        let dest_len = if from == to {
            self.tasks.bucket(to).len() - 1
        } else {
            self.tasks.bucket(to).len()
        };
        let dest_index = to_index.map_or(dest_len, |i| i.min(dest_len));

        if from == to && dest_index == from_index {
            debug!(%from, from_index, "relocate: position unchanged");
            return false;
        }

        let mut task = self.tasks.bucket_mut(from).remove(from_index);
        task.status = to;
        debug!(id = %task.id, %from, from_index, %to, dest_index, "relocate: moving task");
        self.tasks.bucket_mut(to).insert(dest_index, task);
        true
    }
}
