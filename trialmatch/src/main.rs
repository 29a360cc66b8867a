use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trialmatch::config::Config;
use trialmatch::db::{Database, LibSqlBackend, MatchStore};
use trialmatch::embeddings::EmbeddingProvider;
use trialmatch::ingest::{self, SeedMode};
use trialmatch::llm::ExplanationProvider;
use trialmatch::matching::{MatchingEngine, ProcessLock, StopOutcome};
use trialmatch::MatchError;

#[derive(Parser)]
#[command(name = "trialmatch")]
#[command(about = "Patient-to-clinical-trial matching engine")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a full matching cycle over the whole patient population.
    Run {
        /// Label recorded on the run row (manual, scheduled, ...).
        #[arg(long, default_value = "manual")]
        run_type: String,
    },
    /// Request a stop for running cycles and reconcile stale run rows.
    Stop {
        /// How long to wait for the active worker before giving up.
        #[arg(long, default_value_t = 30)]
        wait_seconds: u64,
        /// Polling interval while waiting, in milliseconds.
        #[arg(long, default_value_t = 1000)]
        poll_interval_ms: u64,
    },
    /// Mark orphaned running runs as stopped when no worker holds the lock.
    Reconcile {
        /// Reason recorded on the stopped run rows.
        #[arg(long, default_value = "manual_reconcile")]
        reason: String,
    },
    /// Ingest trials from the built-in sample set or ClinicalTrials.gov.
    Ingest {
        /// Trial source: sample or ctgov.
        #[arg(long, default_value = "sample")]
        source: String,
        /// Maximum studies fetched from the registry.
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },
    /// Generate synthetic patients for demos.
    Seed {
        #[arg(long, default_value_t = 120)]
        count: usize,
        /// Organization slug patients are attached to.
        #[arg(long, default_value = "aga-khan-demo")]
        org: String,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Generation mode: spectrum or random.
        #[arg(long, default_value = "spectrum")]
        mode: String,
        /// Run a full matching cycle after seeding.
        #[arg(long)]
        run_matching: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trialmatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    tracing::info!("Initializing database...");
    let database = Database::new(&config.database).await?;
    let store: Arc<dyn MatchStore> = Arc::new(LibSqlBackend::new(database));

    match args.command {
        Command::Run { run_type } => {
            let engine = build_engine(store, &config)?;
            match engine.run_full_cycle(&run_type).await {
                Ok(run) => {
                    tracing::info!(
                        run_id = %run.id,
                        patients = run.metadata.patients,
                        updates = run.metadata.updates,
                        "Matching run complete"
                    );
                }
                Err(MatchError::AlreadyRunning { running }) => {
                    let running_id = running.map(|run| run.id).unwrap_or_default();
                    tracing::warn!(%running_id, "Skipped: a matching run is already in progress");
                    std::process::exit(1);
                }
                Err(error) => return Err(error.into()),
            }
        }
        Command::Stop {
            wait_seconds,
            poll_interval_ms,
        } => {
            let engine = build_engine(store, &config)?;
            let outcome = engine
                .request_stop(wait_seconds, Duration::from_millis(poll_interval_ms))
                .await?;
            match outcome {
                StopOutcome::NoRunningRun => tracing::info!("No running matching run"),
                StopOutcome::Stopped(ids) => tracing::info!(?ids, "Matching run(s) stopped"),
                StopOutcome::Requested(ids) => {
                    tracing::info!(?ids, "Stop requested; worker left to finish")
                }
                StopOutcome::StillRunning(ids) => {
                    tracing::warn!(?ids, "Matching run(s) still running after wait window");
                    std::process::exit(1);
                }
            }
        }
        Command::Reconcile { reason } => {
            let engine = build_engine(store, &config)?;
            let stopped = engine.reconcile_stale_runs(&reason).await?;
            if stopped.is_empty() {
                tracing::info!("No stale running runs found");
            } else {
                tracing::info!(?stopped, "Stale running run(s) marked stopped");
            }
        }
        Command::Ingest { source, limit } => {
            let embeddings = EmbeddingProvider::new(&config.embeddings)?;
            match source.as_str() {
                "ctgov" => {
                    tracing::info!(limit, "Fetching studies from ClinicalTrials.gov...");
                    let drafts = ingest::fetch_ctgov_trials(limit).await?;
                    let mut ingested = 0usize;
                    for draft in &drafts {
                        ingest::ingest_trial(store.as_ref(), &embeddings, draft).await?;
                        ingested += 1;
                    }
                    tracing::info!(ingested, "Registry ingestion complete");
                }
                _ => {
                    let trials =
                        ingest::ingest_sample_trials(store.as_ref(), &embeddings).await?;
                    tracing::info!(ingested = trials.len(), "Sample ingestion complete");
                }
            }
        }
        Command::Seed {
            count,
            org,
            seed,
            mode,
            run_matching,
        } => {
            let summary = ingest::generate_patients(
                store.as_ref(),
                count,
                &org,
                seed,
                SeedMode::parse(&mode),
            )
            .await?;
            tracing::info!(
                created = summary.created,
                org = %summary.organization_slug,
                distribution = ?summary.profile_distribution,
                "Seeding complete"
            );

            if run_matching {
                let engine = build_engine(store, &config)?;
                match engine.run_full_cycle("mock_generation").await {
                    Ok(run) => tracing::info!(run_id = %run.id, "Post-seed matching run complete"),
                    Err(MatchError::AlreadyRunning { .. }) => {
                        tracing::warn!("Skipped matching run: another run is already in progress")
                    }
                    Err(error) => return Err(error.into()),
                }
            }
        }
    }

    Ok(())
}

fn build_engine(store: Arc<dyn MatchStore>, config: &Config) -> anyhow::Result<MatchingEngine> {
    let embeddings = Arc::new(EmbeddingProvider::new(&config.embeddings)?);
    let explainer = Arc::new(ExplanationProvider::new(config.llm.clone())?);
    let lock = Arc::new(ProcessLock::default());
    Ok(MatchingEngine::new(
        store, embeddings, explainer, lock, config,
    ))
}
