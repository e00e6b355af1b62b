use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

mod cancel;
mod overrides;
mod run_result;
mod runner;
mod scenario;
mod summary;

use cancel::CancellationToken;
use runner::{BatchJob, SeedResult};

#[derive(Parser)]
#[command(
    name = "peril_bench",
    about = "Batch runner for Pipeline & Peril scenarios"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file across multiple seeds.
    Run {
        /// Path to the scenario JSON file.
        #[arg(long)]
        scenario: String,
        /// Output directory (default: runs/).
        #[arg(long, default_value = "runs")]
        output_dir: String,
        /// Stop launching new games after this many seconds.
        #[arg(long)]
        time_limit_secs: Option<u64>,
    },
}

/// Outcome of one seed: finished, failed with an error, or skipped after
/// cancellation.
enum SeedOutcome {
    Finished(SeedResult),
    Failed,
    Skipped,
}

#[allow(clippy::too_many_lines)]
fn run(scenario_path: &str, output_dir: &str, time_limit: Option<Duration>) -> Result<()> {
    let scenario = scenario::load_scenario(Path::new(scenario_path))?;
    let seeds = scenario.seeds.expand();

    let mut config = scenario.config.clone();
    overrides::apply_overrides(&mut config, &scenario.overrides)?;
    config.validate().context("invalid scenario config")?;

    println!(
        "Loading scenario '{}': {} seeds × up to {} rounds, {} victory",
        scenario.name,
        seeds.len(),
        config.max_rounds,
        config.victory.label()
    );

    let scenario_params = serde_json::json!({
        "max_rounds": config.max_rounds,
        "players": config.players.len(),
        "victory": config.victory,
        "strategies": scenario.strategies,
        "overrides": scenario.overrides,
    });

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let run_dir = PathBuf::from(output_dir).join(format!("{}_{}", scenario.name, timestamp));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("creating output directory: {}", run_dir.display()))?;
    std::fs::copy(scenario_path, run_dir.join("scenario.json")).context("copying scenario file")?;

    println!("Output: {}", run_dir.display());
    println!("Running {} seeds in parallel...", seeds.len());

    let job = BatchJob {
        config: &config,
        strategies: &scenario.strategies,
        scenario_name: &scenario.name,
        scenario_params: &scenario_params,
        write_events: scenario.write_events,
    };
    let token = CancellationToken::new(time_limit);
    let failures: Mutex<Vec<(u64, String)>> = Mutex::new(Vec::new());

    let outcomes: Vec<SeedOutcome> = seeds
        .par_iter()
        .map(|&seed| {
            if token.is_cancelled() {
                return SeedOutcome::Skipped;
            }
            let seed_dir = run_dir.join(format!("seed_{seed}"));
            // A panicking game must not take the rest of the batch with it.
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
                runner::run_seed(&job, seed, &seed_dir)
            }));
            let message = match attempt {
                Ok(Ok(result)) => return SeedOutcome::Finished(result),
                Ok(Err(err)) => format!("{err:#}"),
                Err(payload) => panic_message(payload.as_ref()),
            };
            warn!(seed, error = %message, "seed failed");
            failures.lock().push((seed, message));
            SeedOutcome::Failed
        })
        .collect();

    let skipped = outcomes
        .iter()
        .filter(|o| matches!(o, SeedOutcome::Skipped))
        .count();
    let seed_results: Vec<SeedResult> = outcomes
        .into_iter()
        .filter_map(|o| match o {
            SeedOutcome::Finished(result) => Some(result),
            SeedOutcome::Failed | SeedOutcome::Skipped => None,
        })
        .collect();
    let mut failures = failures.into_inner();
    failures.sort_by_key(|(seed, _)| *seed);
    for (seed, message) in &failures {
        eprintln!("Seed {seed} failed: {message}");
    }
    if skipped > 0 {
        println!("Time limit reached: {skipped} seeds not started.");
    }
    if seed_results.is_empty() {
        anyhow::bail!("no seed finished");
    }

    let games: Vec<(&str, &run_result::SummaryMetrics)> = seed_results
        .iter()
        .map(|r| (r.result.label(), &r.summary))
        .collect();
    let stats = summary::compute_summary(&games, failures.len());
    summary::print_summary(&scenario.name, config.max_rounds, &stats);

    let summary_path = run_dir.join("summary.json");
    run_result::write_json_atomic(&stats, &summary_path)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    let run_ids: Vec<&str> = seed_results.iter().map(|r| r.run_id.as_str()).collect();
    let failed_seeds: Vec<u64> = failures.iter().map(|(seed, _)| *seed).collect();
    let batch_summary = serde_json::json!({
        "batch_schema_version": 1,
        "batch_id": Uuid::new_v4().to_string(),
        "scenario_name": scenario.name,
        "scenario_params": scenario_params,
        "seed_count": seed_results.len(),
        "failed_seeds": failed_seeds,
        "skipped_count": skipped,
        "run_ids": run_ids,
        "outcome_counts": stats.outcome_counts,
        "cooperative_win_rate": stats.cooperative_win_rate,
        "aggregated_metrics": summary::aggregated_metrics(&stats),
    });
    let batch_path = run_dir.join("batch_summary.json");
    run_result::write_json_atomic(&batch_summary, &batch_path)
        .with_context(|| format!("writing {}", batch_path.display()))?;

    info!(
        games = seed_results.len(),
        failed = failures.len(),
        skipped,
        "batch complete"
    );
    println!("Summary written to {}", summary_path.display());
    println!("Batch summary written to {}", batch_path.display());
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("panicked: {text}")
    } else {
        "panicked".to_string()
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            scenario,
            output_dir,
            time_limit_secs,
        } => run(
            &scenario,
            &output_dir,
            time_limit_secs.map(Duration::from_secs),
        )?,
    }
    Ok(())
}
