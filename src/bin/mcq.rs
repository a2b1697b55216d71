#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mcq_harness::dataset;
use mcq_harness::driver;
use mcq_harness::embedding::VnptEmbedder;
use mcq_harness::gateway::{ModelTier, NoopUsageSink, RetryingGateway, StderrUsageSink};
use mcq_harness::solvers::SolverDeps;
use mcq_harness::vector_index::FlatFileIndex;
use mcq_harness::worker::{BatchWorker, FsRunStorage, StemWorkerTask};

#[derive(Parser)]
#[command(name = "mcq", version, about = "Routed multiple-choice answering CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log each provider call to stderr as JSON lines
    #[arg(long, global = true)]
    log_usage: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Route and solve every question, writing the submission CSV
    Predict {
        /// Path to the JSON array of {qid, question, choices}
        #[arg(long)]
        input: PathBuf,
        /// Output submission CSV path
        #[arg(long, default_value = "submission.csv")]
        out: PathBuf,
        /// Pre-built vector index for the Reasoning/MD path
        #[arg(long)]
        index: Option<PathBuf>,
        /// Model tier used by the router's classifier
        #[arg(long, default_value = "large")]
        router_tier: ModelTier,
        /// Add a per-item elapsed-time column to the CSV
        #[arg(long)]
        with_time: bool,
    },
    /// Run the resumable STEM batch worker over a dataset
    Batch {
        #[arg(long)]
        input: PathBuf,
        /// Directory for artifacts and the checkpoint
        #[arg(long, default_value = "batch_out")]
        out_dir: PathBuf,
        /// Pause after a rate-limit signal, in seconds
        #[arg(long, default_value_t = 3600)]
        rate_limit_pause_secs: u64,
    },
    /// Route every question without solving, writing {qid, label, subtype}
    Classify {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = "large")]
        router_tier: ModelTier,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Predict {
            input,
            out,
            index,
            router_tier,
            with_time,
        } => {
            let questions = dataset::load_questions(&input)?;
            let deps = build_deps(cli.log_usage, index)?;

            let rows = driver::predict(&deps, router_tier, &questions).await;
            driver::write_submission_csv(&out, &rows, with_time)?;
            eprintln!("[predict] wrote {} rows to {}", rows.len(), out.display());
        }
        Commands::Batch {
            input,
            out_dir,
            rate_limit_pause_secs,
        } => {
            let questions = dataset::load_questions(&input)?;
            let gateway = build_gateway(cli.log_usage)?;
            let storage = FsRunStorage::new(&out_dir)?;

            let worker = BatchWorker::new(Box::new(StemWorkerTask::new(gateway)), storage)
                .rate_limit_pause(Duration::from_secs(rate_limit_pause_secs));
            let summary = worker.run(&questions).await?;
            eprintln!(
                "[batch] done: {} processed, {} skipped, artifacts in {}",
                summary.processed,
                summary.skipped,
                out_dir.display()
            );
        }
        Commands::Classify {
            input,
            out,
            router_tier,
        } => {
            let questions = dataset::load_questions(&input)?;
            let gateway = build_gateway(cli.log_usage)?;

            let decisions = driver::classify_all(gateway.as_ref(), router_tier, &questions).await;
            let records: Vec<serde_json::Value> = decisions
                .iter()
                .map(|(qid, d)| {
                    serde_json::json!({
                        "qid": qid,
                        "label": d.label.as_str(),
                        "subtype": d.subtype.as_str(),
                    })
                })
                .collect();
            std::fs::write(&out, serde_json::to_string_pretty(&records)?)?;
            eprintln!(
                "[classify] wrote {} decisions to {}",
                records.len(),
                out.display()
            );
        }
    }

    Ok(())
}

fn build_gateway(
    log_usage: bool,
) -> Result<Arc<dyn mcq_harness::CompletionGateway>, Box<dyn std::error::Error>> {
    // The sink choice changes the gateway's concrete type, so box both arms.
    Ok(if log_usage {
        Arc::new(RetryingGateway::from_env(Arc::new(StderrUsageSink))?)
    } else {
        Arc::new(RetryingGateway::from_env(Arc::new(NoopUsageSink))?)
    })
}

fn build_deps(
    log_usage: bool,
    index_path: Option<PathBuf>,
) -> Result<SolverDeps, Box<dyn std::error::Error>> {
    let gateway = build_gateway(log_usage)?;
    let embedder = Arc::new(VnptEmbedder::from_env()?);

    let index = match index_path {
        Some(path) => {
            let index = FlatFileIndex::load(&path, embedder.clone())?;
            eprintln!(
                "[mcq] loaded vector index with {} passages from {}",
                index.len(),
                path.display()
            );
            Some(Arc::new(index) as Arc<dyn mcq_harness::vector_index::VectorIndex>)
        }
        None => None,
    };

    Ok(SolverDeps {
        gateway,
        embedder,
        index,
    })
}
