//! CLI for the crawl-and-monitor service
//!
//! Every command prints JSON (except `artifact`, which prints the llms.txt
//! text). `serve` keeps running and re-crawls monitored sites on a timer.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use server_core::config::Config;
use server_core::kernel::{start_scheduler, ServerDeps};
use site_monitor::JobId;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "site-monitor")]
#[command(about = "Crawl websites into llms.txt artifacts and keep them current")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a URL for crawling
    Submit {
        url: String,
        /// Return right after queuing; `serve` picks the job up later
        #[arg(long)]
        no_wait: bool,
    },

    /// Show a job
    Job { id: JobId },

    /// Show crawl progress for a job
    Progress { id: JobId },

    /// List the stored pages of a completed job
    Pages { id: JobId },

    /// Print the llms.txt artifact of a completed job
    Artifact { id: JobId },

    /// List jobs, newest first
    List {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Enable or disable periodic monitoring for a job
    Monitor {
        id: JobId,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
    },

    /// Delete a job and its pages
    Reset { id: JobId },

    /// Run a monitoring sweep now
    Sweep,

    /// Show monitoring status
    Status,

    /// Run scheduled monitoring sweeps until interrupted
    Serve,
}

#[derive(Serialize)]
struct Response {
    success: bool,
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,site_monitor=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::debug!("Configuration loaded");

    let deps = ServerDeps::build(&config).await?;
    let orchestrator = &deps.orchestrator;

    match cli.command {
        Commands::Submit { url, no_wait } => {
            let submission = orchestrator
                .submit(&url)
                .await
                .with_context(|| format!("Failed to submit {}", url))?;
            if no_wait {
                print_json(&submission)?;
            } else {
                orchestrator.wait_idle().await;
                let job = orchestrator.get_job(submission.job.id).await?;
                print_json(&job)?;
            }
        }
        Commands::Job { id } => print_json(&orchestrator.get_job(id).await?)?,
        Commands::Progress { id } => print_json(&orchestrator.get_progress(id).await?)?,
        Commands::Pages { id } => print_json(&orchestrator.get_pages(id).await?)?,
        Commands::Artifact { id } => println!("{}", orchestrator.artifact(id).await?),
        Commands::List { offset, limit } => {
            print_json(&orchestrator.list_jobs(offset, limit).await?)?
        }
        Commands::Monitor {
            id,
            enable,
            disable,
        } => {
            if !enable && !disable {
                bail!("Pass --enable or --disable");
            }
            print_json(&orchestrator.set_monitoring(id, enable).await?)?
        }
        Commands::Reset { id } => {
            orchestrator.reset_job(id).await?;
            print_json(&Response {
                success: true,
                message: format!("Job {} deleted", id),
            })?
        }
        Commands::Sweep => {
            let outcome = deps.scheduler.trigger_sweep().await?;
            orchestrator.wait_idle().await;
            print_json(&outcome)?
        }
        Commands::Status => print_json(&deps.scheduler.status().await?)?,
        Commands::Serve => serve(&config, &deps).await?,
    }

    Ok(())
}

async fn serve(config: &Config, deps: &ServerDeps) -> Result<()> {
    tracing::info!("Starting site monitor");

    let requeued = deps
        .orchestrator
        .reconcile_abandoned(config.monitor.stale_attempt_after)
        .await
        .context("Failed to re-queue interrupted jobs")?;
    if !requeued.is_empty() {
        tracing::info!(count = requeued.len(), "Resumed interrupted jobs");
    }

    let mut scheduler = start_scheduler(deps.scheduler.clone(), config.monitor.monitor_interval)
        .await
        .context("Failed to start scheduled tasks")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down; waiting for running crawls");

    scheduler.shutdown().await?;
    deps.orchestrator.wait_idle().await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
