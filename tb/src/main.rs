//! Taskboard - projects and tasks on a three-column board
//!
//! CLI entry point. Every invocation loads the board from the configured
//! store, applies one command and exits.

use std::fs;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, bail};
use tracing::{debug, info};

use kvstore::FileStore;
use taskboard::cli::{Cli, Command, GithubCommand, OutputFormat, ProjectCommand, TaskCommand, get_log_path};
use taskboard::config::Config;
use taskboard::github::{GitHubClient, RepoSource, Repository};
use taskboard::{
    Board, ConsoleNotifier, NewProject, NewTask, Priority, Project, ProjectPatch, Snapshot, Task, TaskPatch,
    TaskStatus,
};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    let store = FileStore::open(&config.storage.path)
        .context(format!("Failed to open store at {}", config.storage.path.display()))?;
    info!(path = %config.storage.path.display(), "Opened store");

    let board = Board::open(Arc::new(store), Arc::new(ConsoleNotifier));
    board.ready().await.context("Failed to load board")?;

    // An unreadable board must not be replaced by the empty stand-in
    if matches!(cli.command, Command::Project { .. } | Command::Task { .. }) {
        board
            .ensure_loaded()
            .context(format!("Failed to read {}", config.storage.path.display()))?;
    }

    // Dispatch command
    debug!(command = ?cli.command, "main: dispatching command");
    let result = match cli.command {
        Command::Project { command } => cmd_project(&board, command).await,
        Command::Task { command } => cmd_task(&board, command).await,
        Command::Github { command } => cmd_github(&board, &config, command).await,
    };

    board.state().shutdown().await.ok();
    result
}

// === Projects ===

async fn cmd_project(board: &Board, command: ProjectCommand) -> Result<()> {
    debug!(?command, "cmd_project: called");
    match command {
        ProjectCommand::Add {
            name,
            project_type,
            description,
            status,
            repo,
        } => {
            let mut new = NewProject::new(name)
                .with_type(project_type)
                .with_description(description);
            if let Some(status) = status {
                new = new.with_status(status);
            }
            if let Some(repo) = repo {
                new = new.with_github_repo(repo);
            }
            let project = board.add_project(new).await?;
            println!("{}", project.id);
        }
        ProjectCommand::List { format } => {
            let snapshot = board.snapshot();
            match format {
                OutputFormat::Json => print_json(&snapshot.projects)?,
                OutputFormat::Text => print_projects(&snapshot),
            }
        }
        ProjectCommand::Show { id, format } => {
            let id = board.resolve_project(&id)?;
            let snapshot = board.snapshot();
            let Some(project) = snapshot.project(&id) else {
                bail!("Project {} disappeared", id);
            };
            let tasks = snapshot.tasks_for_project(&id);
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "project": project,
                    "progress": snapshot.project_progress(&id),
                    "tasks": tasks,
                }))?,
                OutputFormat::Text => print_project_detail(&snapshot, project, &tasks),
            }
        }
        ProjectCommand::Update {
            id,
            name,
            project_type,
            description,
            status,
        } => {
            let id = board.resolve_project(&id)?;
            let patch = ProjectPatch {
                name,
                r#type: project_type,
                description,
                status,
                github_repo: None,
            };
            if patch.is_empty() {
                bail!("Nothing to update");
            }
            board.update_project(&id, patch).await?;
        }
        ProjectCommand::Delete { id } => {
            let id = board.resolve_project(&id)?;
            board.delete_project(&id).await?;
        }
        ProjectCommand::Link { id, repo } => {
            let id = board.resolve_project(&id)?;
            board.link_repository(&id, &repo).await?;
        }
        ProjectCommand::Unlink { id } => {
            let id = board.resolve_project(&id)?;
            board.unlink_repository(&id).await?;
        }
    }
    Ok(())
}

// === Tasks ===

async fn cmd_task(board: &Board, command: TaskCommand) -> Result<()> {
    debug!(?command, "cmd_task: called");
    match command {
        TaskCommand::Add {
            title,
            description,
            priority,
            project,
            deadline,
            status,
        } => {
            let mut new = NewTask::new(title).with_description(description).with_priority(priority);
            if let Some(project) = project {
                new = new.with_project(board.resolve_project(&project)?);
            }
            if let Some(deadline) = deadline {
                new = new.with_deadline(deadline);
            }
            if let Some(status) = status {
                new = new.with_status(status);
            }
            let task = board.add_task(new).await?;
            println!("{}", task.id);
        }
        TaskCommand::List {
            status,
            project,
            format,
        } => {
            let project = project.map(|p| board.resolve_project(&p)).transpose()?;
            let snapshot = board.snapshot();
            let statuses: Vec<TaskStatus> = match status {
                Some(status) => vec![status],
                None => TaskStatus::ALL.to_vec(),
            };
            let keep = |t: &&Task| project.as_deref().is_none_or(|p| t.project_id.as_deref() == Some(p));

            match format {
                OutputFormat::Json => {
                    let buckets: serde_json::Map<String, serde_json::Value> = statuses
                        .iter()
                        .map(|s| {
                            let tasks: Vec<&Task> = snapshot.tasks.bucket(*s).iter().filter(keep).collect();
                            Ok((s.as_str().to_string(), serde_json::to_value(tasks)?))
                        })
                        .collect::<Result<_, serde_json::Error>>()?;
                    print_json(&buckets)?;
                }
                OutputFormat::Text => {
                    for s in statuses {
                        let tasks: Vec<&Task> = snapshot.tasks.bucket(s).iter().filter(keep).collect();
                        println!("{} ({})", s.label().bold(), tasks.len());
                        for task in tasks {
                            print_task(&snapshot, task);
                        }
                    }
                }
            }
        }
        TaskCommand::Update {
            id,
            title,
            description,
            priority,
            project,
            no_project,
            deadline,
            no_deadline,
            status,
        } => {
            let id = board.resolve_task(&id)?;
            let project_id = match (project, no_project) {
                (_, true) => Some(None),
                (Some(p), false) => Some(Some(board.resolve_project(&p)?)),
                (None, false) => None,
            };
            let deadline = match (deadline, no_deadline) {
                (_, true) => Some(None),
                (Some(d), false) => Some(Some(d)),
                (None, false) => None,
            };
            let patch = TaskPatch {
                title,
                description,
                priority,
                project_id,
                deadline,
                status,
            };
            if patch.is_empty() {
                bail!("Nothing to update");
            }
            board.update_task(&id, patch).await?;
        }
        TaskCommand::Move { id, to, index } => {
            let id = board.resolve_task(&id)?;
            if !board.move_task(&id, to, index).await? {
                println!("Task already at that position");
            }
        }
        TaskCommand::Delete { id } => {
            let id = board.resolve_task(&id)?;
            board.delete_task(&id).await?;
        }
    }
    Ok(())
}

// === GitHub ===

async fn cmd_github(board: &Board, config: &Config, command: GithubCommand) -> Result<()> {
    debug!("cmd_github: called");
    match command {
        GithubCommand::Token { token: Some(token) } => {
            board.set_github_token(&token).await?;
            println!("{} GitHub token stored", "✓".green());
        }
        GithubCommand::Token { token: None } => match board.github_token().await? {
            Some(_) => println!("A GitHub token is stored"),
            None => println!("No GitHub token stored. Set one with: tb github token <TOKEN>"),
        },
        GithubCommand::Repos { format } => {
            let Some(token) = board.github_token().await? else {
                bail!("No GitHub token stored. Set one with: tb github token <TOKEN>");
            };
            let client = GitHubClient::from_config(&config.github)?;
            let repos = client
                .list_repositories(&token)
                .await
                .context("Failed to list GitHub repositories")?;
            match format {
                OutputFormat::Json => print_json(&repos)?,
                OutputFormat::Text => print_repos(&repos),
            }
        }
    }
    Ok(())
}

// === Output ===

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_projects(snapshot: &Snapshot) {
    if snapshot.projects.is_empty() {
        println!("No projects");
        return;
    }
    for project in &snapshot.projects {
        let progress = snapshot.project_progress(&project.id);
        let repo = project.github_repo.as_deref().unwrap_or("");
        println!(
            "{}  {:<24} {:<12} {:>5.1}%  {}",
            project.id.dimmed(),
            project.name.bold(),
            project.status.to_string(),
            progress,
            repo.cyan()
        );
    }
}

fn print_project_detail(snapshot: &Snapshot, project: &Project, tasks: &[&Task]) {
    println!("{} {}", project.name.bold(), project.id.dimmed());
    if !project.r#type.is_empty() {
        println!("  type:     {}", project.r#type);
    }
    println!("  status:   {}", project.status);
    println!("  progress: {:.1}%", snapshot.project_progress(&project.id));
    if let Some(repo) = &project.github_repo {
        println!("  repo:     {}", repo.cyan());
    }
    if !project.description.is_empty() {
        println!("\n{}", project.description);
    }
    println!();
    for task in tasks {
        print_task(snapshot, task);
    }
}

fn print_task(snapshot: &Snapshot, task: &Task) {
    let priority = match task.priority {
        Priority::Urgent => task.priority.to_string().red().bold(),
        Priority::High => task.priority.to_string().yellow(),
        Priority::Medium => task.priority.to_string().normal(),
        Priority::Low => task.priority.to_string().dimmed(),
    };
    let project = task
        .project_id
        .as_deref()
        .and_then(|id| snapshot.project(id))
        .map(|p| format!(" [{}]", p.name))
        .unwrap_or_default();
    let deadline = match task.deadline {
        Some(d) if task.is_overdue(Utc::now()) => format!(" due {}", d.format("%Y-%m-%d")).red().to_string(),
        Some(d) => format!(" due {}", d.format("%Y-%m-%d")),
        None => String::new(),
    };
    println!("  {}  {:<7} {}{}{}", task.id.dimmed(), priority, task.title, project, deadline);
}

fn print_repos(repos: &[Repository]) {
    if repos.is_empty() {
        println!("No repositories");
        return;
    }
    for repo in repos {
        let visibility = if repo.private { "private".yellow() } else { "public".normal() };
        println!("{:<40} {:<8} {}", repo.full_name.bold(), visibility, repo.html_url.dimmed());
    }
}
