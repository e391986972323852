//! Runbook CLI.
//!
//! Operator surface over the runbook engine: list catalog tasks, parse raw
//! documents into procedure drafts, resolve incidents, execute procedures
//! step-by-step or in full, and upload assembled procedures.

mod procedure_file;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use runbook_engine::{ExecutionStatus, ProcedureSession, RunReport};
use runbook_services::types::Generation;
use runbook_services::{
    DocumentParser, ProcedureGenerator, ProcedureStore, RemoteService, ServiceConfig,
    ShellExecutor, TaskCatalog, TaskExecutor,
};

use procedure_file::{seed_session, ProcedureFile};

#[derive(Parser)]
#[command(name = "runbookctl")]
#[command(version, about = "Runbook command line tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Remediation service URL (overrides RUNBOOK_SERVICE_URL)
    #[arg(long)]
    service_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List worker tasks available in the catalog
    Tasks,

    /// Parse a raw runbook document into a procedure draft
    Parse {
        /// Path to the raw text document
        file: PathBuf,
    },

    /// Generate a procedure draft from free-form notes
    Generate {
        /// Path to the raw text notes
        file: PathBuf,

        /// Answers to a previous clarification round, in question order
        #[arg(long = "answer", value_name = "TEXT")]
        answers: Vec<String>,
    },

    /// Resolve an incident into a procedure and print the resolved steps
    Incident {
        /// Incident number, e.g. INC0012345
        number: String,
    },

    /// Execute a procedure file against the executor capability
    Run {
        /// Path to the procedure YAML file
        file: PathBuf,

        /// Execute only the step at this position (1-based)
        #[arg(short, long)]
        step: Option<usize>,

        /// Execute tasks locally through the shell instead of the service
        #[arg(long)]
        local: bool,
    },

    /// Upload a procedure file to the procedure store
    Upload {
        /// Path to the procedure YAML file
        file: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,runbook_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = ServiceConfig::from_env().context("load configuration")?;
    if let Some(url) = cli.service_url {
        config.service_url = url;
    }

    let remote = Arc::new(RemoteService::new(
        config.service_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
    ));

    match cli.command {
        Commands::Tasks => list_tasks(remote.as_ref()).await,
        Commands::Parse { file } => parse_document(remote.as_ref(), &file).await,
        Commands::Generate { file, answers } => {
            generate_procedure(remote.as_ref(), &file, answers).await
        }
        Commands::Incident { number } => resolve_incident(&remote, &number).await,
        Commands::Run { file, step, local } => {
            let executor: Arc<dyn TaskExecutor> = if local {
                let mut shell = ShellExecutor::new(remote.clone()).with_shell(config.shell.clone());
                if let Some(secs) = config.task_deadline_secs {
                    shell = shell.with_deadline(Duration::from_secs(secs));
                }
                Arc::new(shell)
            } else {
                remote.clone()
            };
            run_procedure(&remote, executor, &file, step).await
        }
        Commands::Upload { file } => upload_procedure(&remote, &file).await,
    }
}

async fn list_tasks(catalog: &dyn TaskCatalog) -> Result<()> {
    let tasks = catalog.list().await.context("list catalog tasks")?;
    if tasks.is_empty() {
        println!("No worker tasks registered.");
        return Ok(());
    }
    for task in tasks {
        let params: Vec<String> = task
            .param_specs
            .iter()
            .map(|p| {
                if p.required {
                    format!("{}*", p.name)
                } else {
                    p.name.clone()
                }
            })
            .collect();
        println!("{:<6} {:<30} [{}]", task.id, task.name, params.join(", "));
    }
    Ok(())
}

async fn parse_document(parser: &dyn DocumentParser, file: &PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("read document {}", file.display()))?;
    let draft = parser.parse(&raw).await.context("parse document")?;
    print_draft(&draft);
    Ok(())
}

fn print_draft(draft: &runbook_services::types::ProcedureDraft) {
    println!("title: {}", draft.title);
    println!("issue: {}", draft.issue);
    println!("steps:");
    for step in &draft.steps {
        match &step.task_name {
            Some(task) => println!("  - {}  (task: {})", step.description, task),
            None => println!("  - {}  (manual)", step.description),
        }
    }
}

async fn generate_procedure(
    generator: &dyn ProcedureGenerator,
    file: &PathBuf,
    answers: Vec<String>,
) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("read notes {}", file.display()))?;
    let answers = if answers.is_empty() {
        None
    } else {
        Some(answers)
    };
    let generation = generator
        .generate_procedure(&raw, answers.as_deref())
        .await
        .context("generate procedure")?;

    match generation {
        Generation::ClarificationNeeded { questions } => {
            println!("The generator needs more detail; answer with --answer, in order:");
            for (index, question) in questions.iter().enumerate() {
                println!("  {}. {}", index + 1, question);
            }
        }
        Generation::Generated { draft } => print_draft(&draft),
    }
    Ok(())
}

async fn resolve_incident(remote: &Arc<RemoteService>, number: &str) -> Result<()> {
    let mut session = new_session(remote, remote.clone());
    session
        .load_incident(remote.as_ref(), number)
        .await
        .context("resolve incident")?;

    println!("incident: {}", session.meta().title);
    println!("issue:    {}", session.meta().issue);
    let seq = session.steps().lock().await;
    for (index, step) in seq.iter().enumerate() {
        let binding = match &step.task_ref {
            Some(task) => format!("task: {}", task.name),
            None => "manual".to_string(),
        };
        println!("  {}. {}  ({})", index + 1, step.description, binding);
        for (name, value) in &step.bound_values {
            println!("       {} = {}", name, value);
        }
    }
    Ok(())
}

async fn run_procedure(
    remote: &Arc<RemoteService>,
    executor: Arc<dyn TaskExecutor>,
    file: &PathBuf,
    step: Option<usize>,
) -> Result<()> {
    let procedure = ProcedureFile::load(file)?;
    let mut session = new_session(remote, executor);
    seed_session(&mut session, procedure, remote.as_ref()).await?;

    match step {
        Some(position) => {
            let id = {
                let seq = session.steps().lock().await;
                let ids = seq.ids();
                if position == 0 || position > ids.len() {
                    bail!("step {} is out of range (1..={})", position, ids.len());
                }
                ids[position - 1]
            };
            let outcome = session.execute_step(id).await?;
            println!("step {}: {}", position, outcome.status);
            println!("{}", outcome.output);
            if !outcome.is_success() {
                bail!("step {} failed", position);
            }
        }
        None => {
            let report = session.execute_all().await?;
            print_report(&session, &report).await;
            if !report.completed() {
                bail!("run halted");
            }
        }
    }
    Ok(())
}

async fn print_report(session: &ProcedureSession, report: &RunReport) {
    let seq = session.steps().lock().await;
    for (index, step) in seq.iter().enumerate() {
        let marker = match step.status {
            ExecutionStatus::Success => "ok",
            ExecutionStatus::Error => "failed",
            ExecutionStatus::Idle => "-",
            ExecutionStatus::Running => "running",
        };
        println!("  {}. [{}] {}", index + 1, marker, step.description);
        if step.status == ExecutionStatus::Error {
            println!("       {}", step.output);
        }
    }
    if let Some((_, message)) = &report.halted {
        println!("run halted: {}", message);
    } else {
        println!(
            "run completed: {} executed, {} skipped",
            report.executed.len(),
            report.skipped.len()
        );
    }
}

async fn upload_procedure(remote: &Arc<RemoteService>, file: &PathBuf) -> Result<()> {
    let procedure = ProcedureFile::load(file)?;
    let mut session = new_session(remote, remote.clone());
    seed_session(&mut session, procedure, remote.as_ref()).await?;

    let id = session
        .upload(remote.as_ref() as &dyn ProcedureStore)
        .await
        .context("upload procedure")?;
    println!("uploaded procedure {}", id);
    Ok(())
}

fn new_session(remote: &Arc<RemoteService>, executor: Arc<dyn TaskExecutor>) -> ProcedureSession {
    ProcedureSession::new(
        remote.clone(),
        remote.clone(),
        remote.clone(),
        executor,
    )
}
