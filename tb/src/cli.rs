//! CLI command definitions and subcommands

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::{Priority, ProjectStatus, TaskStatus};

/// Taskboard - projects and tasks on a three-column board
#[derive(Parser)]
#[command(
    name = "tb",
    about = "Track projects and tasks on a todo / in progress / completed board",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// GitHub token and repositories
    Github {
        #[command(subcommand)]
        command: GithubCommand,
    },
}

/// Project subcommands
#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    /// Create a project
    Add {
        name: String,

        /// Free-form category (web, cli, ...)
        #[arg(short = 't', long = "type", default_value = "")]
        project_type: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// not-started, in-progress or completed
        #[arg(short, long)]
        status: Option<ProjectStatus>,

        /// GitHub repository as owner/name
        #[arg(short, long)]
        repo: Option<String>,
    },

    /// List projects with their progress
    List {
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a project and its tasks
    Show {
        /// Project ID (or partial match, or name)
        id: String,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Change project fields
    Update {
        /// Project ID (or partial match, or name)
        id: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short = 't', long = "type")]
        project_type: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        status: Option<ProjectStatus>,
    },

    /// Delete a project (its tasks stay on the board)
    Delete {
        /// Project ID (or partial match, or name)
        id: String,
    },

    /// Link a project to a GitHub repository
    Link {
        /// Project ID (or partial match, or name)
        id: String,

        /// Repository as owner/name
        repo: String,
    },

    /// Remove a project's repository link
    Unlink {
        /// Project ID (or partial match, or name)
        id: String,
    },
}

/// Task subcommands
#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Create a task
    Add {
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// low, medium, high or urgent
        #[arg(short, long, default_value = "medium")]
        priority: Priority,

        /// Owning project ID (or partial match, or name)
        #[arg(short = 'P', long)]
        project: Option<String>,

        /// Deadline as YYYY-MM-DD or RFC 3339
        #[arg(long, value_parser = parse_deadline)]
        deadline: Option<DateTime<Utc>>,

        /// Bucket to create the task in (todo, in-progress, completed)
        #[arg(short, long)]
        status: Option<TaskStatus>,
    },

    /// List tasks by bucket
    List {
        /// Only show this bucket
        #[arg(short, long)]
        status: Option<TaskStatus>,

        /// Only show tasks of this project
        #[arg(short = 'P', long)]
        project: Option<String>,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Change task fields
    Update {
        /// Task ID (or partial match, or title)
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        priority: Option<Priority>,

        #[arg(short = 'P', long, conflicts_with = "no_project")]
        project: Option<String>,

        /// Detach the task from its project
        #[arg(long)]
        no_project: bool,

        #[arg(long, value_parser = parse_deadline, conflicts_with = "no_deadline")]
        deadline: Option<DateTime<Utc>>,

        /// Clear the deadline
        #[arg(long)]
        no_deadline: bool,

        /// Moving to another bucket appends the task there
        #[arg(short, long)]
        status: Option<TaskStatus>,
    },

    /// Move a task to a bucket
    Move {
        /// Task ID (or partial match, or title)
        id: String,

        /// Destination bucket (todo, in-progress, completed)
        to: TaskStatus,

        /// Position in the destination bucket (appends when omitted)
        #[arg(short, long)]
        index: Option<usize>,
    },

    /// Delete a task
    Delete {
        /// Task ID (or partial match, or title)
        id: String,
    },
}

/// GitHub subcommands
#[derive(Debug, Subcommand)]
pub enum GithubCommand {
    /// Store a GitHub access token, or report whether one is stored
    Token { token: Option<String> },

    /// List repositories visible to the stored token
    Repos {
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for list/show commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

/// Parse a deadline given as a date (midnight UTC) or an RFC 3339 timestamp
pub fn parse_deadline(s: &str) -> Result<DateTime<Utc>, String> {
    debug!(%s, "parse_deadline: called");
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| format!("Invalid date: {}", s));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("Invalid deadline '{}': {}. Use YYYY-MM-DD or RFC 3339", s, e))
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskboard")
        .join("logs")
        .join("taskboard.log")
}
