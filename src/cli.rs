//! Process entry points: the long running daemon and the admin commands that
//! drive the alert and job operations from a shell.

use anyhow::{Context, Result};
use clap::Subcommand;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

use crate::alerts::AlertService;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::job::JobService;
use crate::mail::{SmtpMailer, TemplateStore};
use crate::scheduler::ScheduleEngine;
use crate::store::{AlertFilter, JobFilter, LibsqlStore};

#[derive(Subcommand, Debug, Clone, Default, PartialEq)]
pub enum Command {
    /// Run the scheduler until interrupted (default)
    #[default]
    Run,
    /// Load the job schedules once and print their next fire times
    Schedule,
    /// Manage the recurring mail schedules
    #[command(subcommand)]
    Jobs(JobsCommand),
    /// Manage migration alerts
    #[command(subcommand)]
    Alerts(AlertsCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum JobsCommand {
    /// List jobs
    List {
        #[arg(long)]
        added_by: Option<String>,
    },
    /// Show a single job
    Get { id: String },
    /// Create a job from a JSON document ("-" reads stdin)
    Add { json: String },
    /// Apply a partial JSON update to a job
    Update { id: String, json: String },
    /// Delete a job
    Remove { id: String },
    /// Run a job's alert selection now and queue its mails
    Fire { id: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum AlertsCommand {
    /// List every alert
    List,
    /// List ready alerts migrating within the next week
    Upcoming,
    /// Show a single alert
    Get { migration_id: String },
    /// Create an alert from a JSON document ("-" reads stdin)
    Add { json: String },
    /// Apply a partial JSON update to an alert
    Update { migration_id: String, json: String },
    /// Delete an alert
    Remove { migration_id: String },
}

pub async fn run(command: Command, config: Config) -> Result<()> {
    let store = Arc::new(
        LibsqlStore::open(&config.database_path)
            .await
            .context("Failed to open database")?,
    );
    let templates = Arc::new(TemplateStore::load(config.templates_dir())?);
    if !templates.contains(&config.mail.default_template) {
        warn!(
            "Default template '{}' is not loaded, alert notifications will fail",
            config.mail.default_template
        );
    }
    let mailer = Arc::new(SmtpMailer::from_config(&config.smtp)?);
    let dispatcher = Dispatcher::start(
        config.dispatcher.workers,
        config.dispatcher.queue_capacity,
        templates,
        mailer,
    );

    let result = match command {
        Command::Run => serve(&config, store, &dispatcher).await,
        Command::Schedule => schedule(engine(&config, store, &dispatcher)).await,
        Command::Jobs(command) => jobs(command, &config, store, &dispatcher).await,
        Command::Alerts(command) => {
            let service =
                AlertService::new(store, dispatcher.outbox(), config.alert_mail_settings());
            alerts(command, service).await
        }
    };

    dispatcher.shutdown().await;
    result
}

fn engine(config: &Config, store: Arc<LibsqlStore>, dispatcher: &Dispatcher) -> ScheduleEngine {
    ScheduleEngine::new(
        store.clone(),
        store,
        dispatcher.outbox(),
        config.engine_settings(),
    )
}

async fn serve(config: &Config, store: Arc<LibsqlStore>, dispatcher: &Dispatcher) -> Result<()> {
    let engine = engine(config, store, dispatcher);
    engine.start(&config.scheduler.job_refresh).await?;

    wait_for_shutdown().await?;
    info!("Shutdown initiated");
    engine.shutdown().await;
    Ok(())
}

async fn schedule(engine: ScheduleEngine) -> Result<()> {
    engine.refresh().await?;
    let jobs = engine.scheduled_jobs();
    let entries = engine.armed_schedules();
    engine.shutdown().await;

    for entry in &entries {
        let next = entry
            .next
            .map(|next| next.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!("{:<24} next: {}", entry.spec, next);
    }
    println!("{} jobs armed", jobs.len());
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

async fn jobs(
    command: JobsCommand,
    config: &Config,
    store: Arc<LibsqlStore>,
    dispatcher: &Dispatcher,
) -> Result<()> {
    let service = JobService::new(store.clone());
    match command {
        JobsCommand::List { added_by } => print_json(&service.list(&JobFilter { added_by }).await?),
        JobsCommand::Get { id } => print_json(&service.get(&id).await?),
        JobsCommand::Add { json } => print_json(&service.create(read_json(&json)?).await?),
        JobsCommand::Update { id, json } => {
            print_json(&service.update(&id, read_json(&json)?).await?)
        }
        JobsCommand::Remove { id } => {
            service.delete(&id).await?;
            Ok(())
        }
        JobsCommand::Fire { id } => {
            let job = service.get(&id).await?;
            let queued = engine(config, store, dispatcher).on_job_fire(&job).await;
            info!("Queued {} messages for job '{}'", queued, id);
            Ok(())
        }
    }
}

async fn alerts(command: AlertsCommand, service: AlertService) -> Result<()> {
    match command {
        AlertsCommand::List => print_json(&service.list(&AlertFilter::all()).await?),
        AlertsCommand::Upcoming => print_json(&service.upcoming().await?),
        AlertsCommand::Get { migration_id } => print_json(&service.get(&migration_id).await?),
        AlertsCommand::Add { json } => print_json(&service.create(read_json(&json)?).await?),
        AlertsCommand::Update { migration_id, json } => {
            print_json(&service.update(&migration_id, read_json(&json)?).await?)
        }
        AlertsCommand::Remove { migration_id } => {
            service.delete(&migration_id).await?;
            Ok(())
        }
    }
}

fn read_json<T: DeserializeOwned>(input: &str) -> Result<T> {
    if input == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        return parse_json(&buffer);
    }
    parse_json(input)
}

fn parse_json<T: DeserializeOwned>(input: &str) -> Result<T> {
    serde_json::from_str(input).context("Malformed JSON document")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
