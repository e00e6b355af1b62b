use crate::run_result::{self, RunResult, SummaryMetrics, RUN_SCHEMA_VERSION};
use anyhow::{Context, Result};
use peril_control::{build_strategies, StrategyKind};
use peril_core::{compute_round_metrics, EventEnvelope, GameConfig, RoundMetrics, Simulation, TerminalResult};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

const METRICS_FILE: &str = "rounds.csv";
const EVENTS_FILE: &str = "events.jsonl";

/// Everything shared by the games of one batch.
pub struct BatchJob<'a> {
    pub config: &'a GameConfig,
    pub strategies: &'a [StrategyKind],
    pub scenario_name: &'a str,
    pub scenario_params: &'a serde_json::Value,
    pub write_events: bool,
}

pub struct SeedResult {
    pub seed: u64,
    pub run_id: String,
    pub result: TerminalResult,
    pub summary: SummaryMetrics,
    #[allow(dead_code)]
    pub wall_time_ms: u64,
}

/// Plays one game to completion and writes its output files into `seed_dir`.
/// A game that fails still leaves a `run_result.json` with status `failed`.
pub fn run_seed(job: &BatchJob<'_>, seed: u64, seed_dir: &Path) -> Result<SeedResult> {
    let run_id = Uuid::new_v4().to_string();
    let start = Instant::now();

    std::fs::create_dir_all(seed_dir)
        .with_context(|| format!("creating seed directory: {}", seed_dir.display()))?;

    let mut config = job.config.clone();
    config.seed = seed;
    let strategies = build_strategies(job.strategies, config.players.len(), seed)
        .context("assigning strategies")?;
    let mut sim = Simulation::new(config, strategies).context("starting game")?;
    let outcome = sim.run();

    write_metrics(&seed_dir.join(METRICS_FILE), sim.round_metrics())?;
    let events_path = if job.write_events {
        write_events(&seed_dir.join(EVENTS_FILE), sim.events())?;
        Some(EVENTS_FILE.to_string())
    } else {
        None
    };

    #[allow(clippy::cast_possible_truncation)]
    let wall_time_ms = start.elapsed().as_millis() as u64;
    let state = sim.state();
    let last = sim
        .round_metrics()
        .last()
        .cloned()
        .unwrap_or_else(|| compute_round_metrics(state));
    let summary = SummaryMetrics::from_final(state, &last);

    let mut record = RunResult {
        run_schema_version: RUN_SCHEMA_VERSION,
        run_status: "completed".to_string(),
        run_id: run_id.clone(),
        game_id: Some(state.meta.game_id.to_string()),
        git_sha: run_result::git_sha(),
        git_dirty: run_result::git_dirty(),
        seed,
        scenario_name: job.scenario_name.to_string(),
        scenario_params: job.scenario_params.clone(),
        strategies: sim.strategy_names(),
        rounds_played: state.round,
        wall_time_ms,
        outcome: None,
        result: None,
        summary_metrics: Some(summary.clone()),
        metrics_path: METRICS_FILE.to_string(),
        events_path,
        error_message: None,
    };

    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            warn!(seed, error = %err, "game failed");
            record.run_status = "failed".to_string();
            record.error_message = Some(err.to_string());
            record
                .write_atomic(&seed_dir.join("run_result.json"))
                .context("writing run_result.json")?;
            return Err(err).with_context(|| format!("seed {seed}"));
        }
    };
    record.outcome = Some(result.label().to_string());
    record.result = Some(result.clone());
    record
        .write_atomic(&seed_dir.join("run_result.json"))
        .context("writing run_result.json")?;
    debug!(seed, outcome = result.label(), rounds = state.round, "game finished");

    Ok(SeedResult {
        seed,
        run_id,
        result,
        summary,
        wall_time_ms,
    })
}

fn write_metrics(path: &Path, rows: &[RoundMetrics]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("opening metrics CSV {}", path.display()))?;
    for row in rows {
        writer.serialize(row).context("writing metrics row")?;
    }
    writer.flush().context("flushing metrics")?;
    Ok(())
}

fn write_events(path: &Path, events: &[EventEnvelope]) -> Result<()> {
    let file =
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for envelope in events {
        serde_json::to_writer(&mut out, envelope).context("serializing event")?;
        out.write_all(b"\n")?;
    }
    out.flush().context("flushing events")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn job<'a>(
        config: &'a GameConfig,
        strategies: &'a [StrategyKind],
        params: &'a serde_json::Value,
    ) -> BatchJob<'a> {
        BatchJob {
            config,
            strategies,
            scenario_name: "test_scenario",
            scenario_params: params,
            write_events: true,
        }
    }

    fn short_config() -> GameConfig {
        GameConfig {
            max_rounds: 6,
            ..GameConfig::default()
        }
    }

    #[test]
    fn run_seed_produces_output() {
        let config = short_config();
        let kinds = [StrategyKind::default()];
        let params = serde_json::json!({"max_rounds": 6});
        let temp_dir = TempDir::new().unwrap();
        let seed_dir = temp_dir.path().join("seed_42");

        let result = run_seed(&job(&config, &kinds, &params), 42, &seed_dir).unwrap();

        assert_eq!(result.seed, 42);
        assert!(!result.run_id.is_empty());
        assert!(result.summary.rounds_played <= 6);
        assert!(seed_dir.join(METRICS_FILE).exists());
        assert!(seed_dir.join(EVENTS_FILE).exists());

        let text = std::fs::read_to_string(seed_dir.join("run_result.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["run_schema_version"], 1);
        assert_eq!(parsed["run_status"], "completed");
        assert_eq!(parsed["seed"], 42);
        assert!(parsed["summary_metrics"].is_object());

        let mut reader = csv::Reader::from_path(seed_dir.join(METRICS_FILE)).unwrap();
        let rows: Vec<RoundMetrics> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(rows.len() as u32, result.result.round());
        assert_eq!(rows[0].round, 1);

        let events = std::fs::read_to_string(seed_dir.join(EVENTS_FILE)).unwrap();
        let first: EventEnvelope = serde_json::from_str(events.lines().next().unwrap()).unwrap();
        assert_eq!(first.id.0, 0);
    }

    #[test]
    fn run_seed_is_deterministic() {
        let config = short_config();
        let kinds = [StrategyKind::from_name("adaptive").unwrap()];
        let params = serde_json::json!({});
        let dir1 = TempDir::new().unwrap();
        let dir2 = TempDir::new().unwrap();

        let a = run_seed(&job(&config, &kinds, &params), 7, &dir1.path().join("s")).unwrap();
        let b = run_seed(&job(&config, &kinds, &params), 7, &dir2.path().join("s")).unwrap();

        assert_eq!(a.result, b.result);
        assert_eq!(a.summary.requests_handled, b.summary.requests_handled);
        assert_eq!(a.summary.services_built, b.summary.services_built);
        assert_ne!(a.run_id, b.run_id);
    }

    #[test]
    fn strategy_count_mismatch_is_an_error() {
        let config = short_config();
        let kinds = [StrategyKind::Pass, StrategyKind::Pass];
        let params = serde_json::json!({});
        let dir = TempDir::new().unwrap();
        assert!(run_seed(&job(&config, &kinds, &params), 1, dir.path()).is_err());
    }
}
