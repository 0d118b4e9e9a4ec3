// crates/cli/src/main.rs
//! `geoquery` command-line runner.
//!
//! Loads canned results from a JSON fixture, runs one query job through the
//! job store, and writes the CSV result to `<out-dir>/<job-id>.csv`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use geoquery_core::{JobConfig, StaticEngine};
use geoquery_jobs::{JobPhase, JobStore};
use geoquery_storage::FsDestination;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "geoquery", version, about = "Run query jobs and materialize their results")]
struct Cli {
    /// Log at debug level when RUST_LOG is not set.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one query and write its result as CSV.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// JSON object mapping query text to canned results.
    #[arg(long)]
    fixture: PathBuf,

    /// Query text to submit.
    #[arg(long)]
    query: String,

    #[arg(long, default_value = "adhoc")]
    report_id: String,

    #[arg(long, default_value = "adhoc")]
    query_id: String,

    /// Directory that receives the result file.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => run(args).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "debug"
    } else {
        "warn,geoquery=info,geoquery_jobs=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: RunArgs) -> Result<()> {
    let fixture = tokio::fs::read_to_string(&args.fixture)
        .await
        .with_context(|| format!("reading fixture {}", args.fixture.display()))?;
    let engine = StaticEngine::from_json(&fixture)
        .with_context(|| format!("parsing fixture {}", args.fixture.display()))?;
    let store = JobStore::new(Arc::new(engine), JobConfig::from_env())
        .context("invalid job configuration")?;

    let job = store.create(args.report_id, args.query_id).await;
    let mut statuses = job
        .take_status_receiver()
        .context("status receiver already taken")?;
    let destination = FsDestination::new(&args.out_dir, format!("{}.csv", job.id()))
        .context("invalid result destination")?;
    let path = destination.path();

    job.run(&args.query, Arc::new(destination))
        .await
        .context("query was not accepted")?;

    loop {
        tokio::select! {
            status = statuses.recv() => match status {
                Some(status) => println!("{status}"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted; cancelling jobs");
                store.shutdown().await;
            }
        }
    }

    let snapshot = job.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    match snapshot.phase {
        JobPhase::Succeeded => {
            tracing::info!(path = %path.display(), rows = snapshot.total_rows, "Result written");
            Ok(())
        }
        JobPhase::Failed => bail!(
            "job {} failed: {}",
            snapshot.job_id,
            snapshot.error.unwrap_or_default()
        ),
        phase => bail!("job {} ended without a result ({phase:?})", snapshot.job_id),
    }
}
