use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use pulse_pipeline::{build_scheduler, Pipeline, PipelineConfig, RunMode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pulse-cli")]
#[command(about = "Community sentiment crawler and alerting CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Bug,
    Global,
    All,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Bug => RunMode::Bug,
            ModeArg::Global => RunMode::Global,
            ModeArg::All => RunMode::All,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one crawl cycle for the selected source group.
    Crawl {
        #[arg(long, value_enum, default_value = "all")]
        mode: ModeArg,
    },
    /// Send today's per-category report to the report webhook.
    Report,
    /// Print retention store statistics.
    Stats,
    /// Run the cron scheduler until interrupted (requires
    /// PULSE_SCHEDULER_ENABLED=1).
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let pipeline = Pipeline::new(PipelineConfig::from_env())?;

    match cli.command.unwrap_or(Commands::Crawl { mode: ModeArg::All }) {
        Commands::Crawl { mode } => {
            let summary = pipeline.run_crawl_once(mode.into()).await?;
            println!(
                "crawl complete: run_id={} mode={} sources={} fetched={} bugs={} alerted={}",
                summary.run_id,
                summary.mode,
                summary.sources,
                summary.fetched,
                summary.counts.bug,
                summary.alerted
            );
        }
        Commands::Report => {
            pipeline.run_daily_report().await?;
            println!("daily report dispatched");
        }
        Commands::Stats => {
            let stats = pipeline.stats().await;
            println!(
                "retention: months={} days={} records={}",
                stats.months, stats.days, stats.records
            );
        }
        Commands::Watch => {
            let pipeline = Arc::new(pipeline);
            match build_scheduler(pipeline).await? {
                Some(sched) => {
                    sched.start().await?;
                    info!("scheduler started; press ctrl-c to stop");
                    tokio::signal::ctrl_c().await?;
                    info!("shutting down");
                }
                None => {
                    eprintln!("scheduler disabled; set PULSE_SCHEDULER_ENABLED=1 to enable watch mode");
                }
            }
        }
    }

    Ok(())
}
