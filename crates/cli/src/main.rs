//! longrun CLI - run checkpointed batch tasks under a time budget.

use anyhow::Result;
use clap::{Parser, Subcommand};
use longrun_core::EngineConfig;
use longrun_execution::{BatchRunner, Dispatcher, RunOutcome, RunReport, TaskRegistry, TokioScheduler};
use longrun_storage::{ExecutionStore, JsonFileStore, MemoryStore};
use longrun_tasks::{CountSendersTask, CounterTask, JsonMailbox};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "longrun")]
#[command(about = "Checkpointed long-running batch tasks", long_about = None)]
struct Cli {
    /// Directory of the execution store
    #[arg(long, global = true, default_value = ".longrun")]
    store: PathBuf,

    /// Engine config (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Keep execution records in memory only
    #[arg(long, global = true)]
    memory: bool,

    /// Counter increment per batch
    #[arg(long, global = true, default_value = "1")]
    counter_step: u64,

    /// Value the counter stops at
    #[arg(long, global = true, default_value = "100")]
    counter_target: u64,

    /// JSON file of inbox threads for count_senders
    #[arg(long, global = true)]
    mailbox: Option<PathBuf>,

    /// Stop counting senders after this many threads
    #[arg(long, global = true)]
    max_threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new run and follow its continuations
    Start {
        /// Handler name
        handler: String,
    },
    /// Resume an interrupted run and follow its continuations
    Resume {
        /// Handler name
        handler: String,
    },
    /// Abandon a run
    Stop {
        /// Handler name
        handler: String,
    },
    /// Show the execution record of a run
    Status {
        /// Handler name
        handler: String,
    },
    /// List registered handlers
    Tasks,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let store: Arc<dyn ExecutionStore> = if cli.memory {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(JsonFileStore::new(&cli.store).await?)
    };

    let mailbox = match &cli.mailbox {
        Some(path) => JsonMailbox::load(path).await?,
        None => JsonMailbox::default(),
    };
    let mut senders = CountSendersTask::new(mailbox);
    if let Some(max) = cli.max_threads {
        senders = senders.with_max_threads(max);
    }

    let (scheduler, fired) = TokioScheduler::new();
    let runner = BatchRunner::new(store, Arc::new(scheduler.clone())).with_config(config);
    let registry = Arc::new(
        TaskRegistry::new(Arc::new(runner))
            .register("counter", CounterTask::new(cli.counter_step, cli.counter_target))
            .register("count_senders", senders),
    );
    let mut dispatcher = Dispatcher::new(registry.clone(), scheduler, fired);

    match cli.command {
        Commands::Start { handler } => {
            if handler == "count_senders" && cli.mailbox.is_none() {
                warn!("No --mailbox given, counting senders of an empty inbox");
            }
            let report = registry.initialise(&handler).await?;
            print_report(&report);
            follow(&mut dispatcher).await;
        }
        Commands::Resume { handler } => {
            let report = registry.run(&handler).await?;
            print_report(&report);
            follow(&mut dispatcher).await;
        }
        Commands::Stop { handler } => {
            if registry.stop(&handler).await? {
                println!("Stopped {}", handler);
            } else {
                println!("No execution in progress for {}", handler);
            }
        }
        Commands::Status { handler } => {
            let Some(summary) = registry.status(&handler).await? else {
                println!("No execution in progress for {}", handler);
                return Ok(());
            };

            println!("Task: {}", summary.task);
            println!("  Handler: {}", summary.handler);
            println!("  Batches: {}", summary.batches);
            match summary.continuation_id {
                Some(id) => println!("  Continuation: {}", id),
                None => println!("  Continuation: none"),
            }
            println!("  Started: {}", summary.started_at);
            println!("  Updated: {}", summary.updated_at);
        }
        Commands::Tasks => {
            println!("Handlers:");
            for handler in registry.handlers() {
                println!("  {} -> {}", handler, registry.task_name(handler)?);
            }
        }
    }

    Ok(())
}

async fn follow(dispatcher: &mut Dispatcher) {
    let invocations = dispatcher.run_until_idle().await;
    if invocations > 0 {
        info!("Followed {} continuations", invocations);
    }
}

fn print_report(report: &RunReport) {
    match report.outcome {
        RunOutcome::Completed => println!(
            "{}: completed after {} batches ({} this invocation)",
            report.task, report.total_batches, report.batches_run
        ),
        RunOutcome::Scheduled(id) => println!(
            "{}: {} batches so far, continuation {} scheduled",
            report.task, report.total_batches, id
        ),
    }
}
