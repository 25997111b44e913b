use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use durable_agent::config::{DurableConfig, WorkflowDefinition};
use durable_agent::domain::{TaskId, TaskStatus};
use durable_agent::driver::TaskService;
use durable_agent::event_store::FileTaskStore;
use durable_agent::logging;
use durable_agent::planner::{Action, SequentialPlanner};
use std::path::PathBuf;
use std::sync::Arc;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("DURABLE_AGENT_GIT_SHA"),
    ")"
);

#[derive(Parser)]
#[command(name = "durable")]
#[command(about = "Inspect and manage durable agent tasks")]
#[command(version, long_version = LONG_VERSION)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Config file (defaults to ~/.durable-agent/config.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Task store directory (overrides the config file)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List tasks
    List {
        /// Only tasks in this status
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Show a task's metadata
    Status { task_id: String },
    /// Print a task's journal as JSON lines
    Events { task_id: String },
    /// Replay a task's journal without invoking any agent
    Replay {
        task_id: String,
        /// Workflow YAML describing the agent topology
        #[arg(long)]
        workflow: PathBuf,
    },
    /// Record external input for a paused task
    ProvideInput {
        task_id: String,
        key: String,
        /// JSON value
        value: String,
    },
    /// Cancel a task
    Cancel { task_id: String },
    /// Pause tasks left running by a dead process
    Recover,
    /// Delete a completed, failed or cancelled task
    Cleanup { task_id: String },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = DurableConfig::load_or_default(cli.config.as_deref())?;
    logging::init(config.log_filter.as_deref());

    let store_dir = match cli.store_dir {
        Some(dir) => dir,
        None => config.resolve_store_dir()?,
    };
    let store = FileTaskStore::new(&store_dir)
        .with_context(|| format!("Failed to open task store at {}", store_dir.display()))?;
    let service = TaskService::new(Arc::new(store))
        .with_checkpoint_policy(config.checkpoint_policy)
        .with_retry_policy(config.retry.clone());

    match cli.command {
        Command::List { status } => list(&service, status),
        Command::Status { task_id } => status(&service, parse_task_id(&task_id)?),
        Command::Events { task_id } => events(&service, parse_task_id(&task_id)?),
        Command::Replay { task_id, workflow } => {
            replay(&service, parse_task_id(&task_id)?, &workflow)
        }
        Command::ProvideInput {
            task_id,
            key,
            value,
        } => {
            let task_id = parse_task_id(&task_id)?;
            let value: serde_json::Value = serde_json::from_str(&value)
                .with_context(|| format!("Input value is not valid JSON: {}", value))?;
            service.provide_input(task_id, &key, value)?;
            println!("Recorded input '{}' for task {}", key, task_id);
            Ok(())
        }
        Command::Cancel { task_id } => {
            let task_id = parse_task_id(&task_id)?;
            if service.cancel(task_id)? {
                println!("Cancelled task {}", task_id);
            } else {
                println!("Task {} was not cancelled (unknown or already finished)", task_id);
            }
            Ok(())
        }
        Command::Recover => {
            let recovered = service.recover_interrupted_tasks()?;
            println!("Recovered {} task(s)", recovered.len());
            for task_id in recovered {
                println!("  {}", task_id);
            }
            Ok(())
        }
        Command::Cleanup { task_id } => {
            let task_id = parse_task_id(&task_id)?;
            if service.cleanup(task_id)? {
                println!("Deleted task {}", task_id);
            } else {
                println!("Nothing stored for task {}", task_id);
            }
            Ok(())
        }
    }
}

fn parse_task_id(raw: &str) -> Result<TaskId> {
    TaskId::parse(raw).with_context(|| format!("Invalid task id: {}", raw))
}

fn list(service: &TaskService, status: Option<TaskStatus>) -> Result<()> {
    for task_id in service.list_tasks(status)? {
        let Some(metadata) = service.metadata(task_id)? else {
            continue;
        };
        println!(
            "{}  {:<9}  {:<20}  {}",
            task_id,
            metadata.status,
            metadata.agent_name,
            metadata.updated_at.to_rfc3339()
        );
    }
    Ok(())
}

fn status(service: &TaskService, task_id: TaskId) -> Result<()> {
    let metadata = service
        .metadata(task_id)?
        .with_context(|| format!("Task {} not found", task_id))?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

fn events(service: &TaskService, task_id: TaskId) -> Result<()> {
    for event in service.events(task_id)? {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

fn replay(service: &TaskService, task_id: TaskId, workflow: &std::path::Path) -> Result<()> {
    let definition = WorkflowDefinition::load(workflow)?;
    let preview = service.preview_replay(
        task_id,
        definition.topology(),
        Box::new(SequentialPlanner::new()),
    )?;

    println!(
        "Replayed {}/{} completed invocations",
        preview.replayed_count, preview.completed_event_count
    );
    println!("Scope:");
    println!("{}", serde_json::to_string_pretty(preview.scope.state())?);
    match &preview.next_action {
        Action::Invoke(call) => println!("Next action: invoke '{}'", call.agent_name),
        Action::Done { result } => println!(
            "Next action: done ({})",
            result
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "no result".to_string())
        ),
    }
    Ok(())
}
