//! User-facing notifications
//!
//! The board layer reports every successful mutation through a [`Notifier`].
//! Notifications are fire-and-forget: a notifier cannot fail the operation
//! that triggered it.

use colored::Colorize;
use tracing::{debug, info};

/// A short notification shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn task_created(title: &str) -> Self {
        Self::new("Task Created", format!("Task \"{}\" has been created", title))
    }

    pub fn task_updated(title: &str) -> Self {
        Self::new("Task Updated", format!("Task \"{}\" has been updated", title))
    }

    pub fn task_moved(title: &str, to: &str) -> Self {
        Self::new("Task Moved", format!("Task \"{}\" moved to {}", title, to))
    }

    pub fn task_deleted() -> Self {
        Self::new("Task Deleted", "Task has been deleted")
    }

    pub fn project_created(name: &str) -> Self {
        Self::new("Project Created", format!("Project \"{}\" has been created", name))
    }

    pub fn project_updated(name: &str) -> Self {
        Self::new("Project Updated", format!("Project \"{}\" has been updated", name))
    }

    pub fn project_deleted() -> Self {
        Self::new("Project Deleted", "Project has been deleted")
    }

    pub fn repository_linked(name: &str, repo: &str) -> Self {
        Self::new("Repository Linked", format!("Project \"{}\" is linked to {}", name, repo))
    }

    pub fn repository_unlinked(name: &str) -> Self {
        Self::new("Repository Unlinked", format!("Project \"{}\" has no linked repository", name))
    }
}

/// Sink for user-facing notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Prints a coloured line to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: &Notice) {
        debug!(title = %notice.title, "ConsoleNotifier::notify: called");
        eprintln!("{} {}: {}", "✓".green(), notice.title.bold(), notice.body);
    }
}

/// Emits notifications as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        info!(title = %notice.title, body = %notice.body, "notification");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Notifier that records every notice it receives
    #[derive(Debug, Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) notices: Mutex<Vec<Notice>>,
    }

    impl RecordingNotifier {
        pub(crate) fn titles(&self) -> Vec<String> {
            self.notices.lock().unwrap().iter().map(|n| n.title.clone()).collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: &Notice) {
            self.notices.lock().unwrap().push(notice.clone());
        }
    }

    #[test]
    fn test_task_messages() {
        assert_eq!(
            Notice::task_created("Write docs"),
            Notice::new("Task Created", "Task \"Write docs\" has been created")
        );
        assert_eq!(Notice::task_updated("X").body, "Task \"X\" has been updated");
        assert_eq!(Notice::task_deleted().body, "Task has been deleted");
    }

    #[test]
    fn test_project_messages() {
        assert_eq!(Notice::project_created("Site").title, "Project Created");
        assert_eq!(Notice::project_deleted().body, "Project has been deleted");
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::default();
        notifier.notify(&Notice::task_deleted());
        LogNotifier.notify(&Notice::task_deleted());
        assert_eq!(notifier.titles(), vec!["Task Deleted"]);
    }
}
