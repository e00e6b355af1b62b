use peril_core::{GameState, RoundMetrics, TerminalResult};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

pub const RUN_SCHEMA_VERSION: u32 = 1;

/// Per-game record written next to the game's round metrics.
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub run_schema_version: u32,
    pub run_status: String,
    pub run_id: String,
    pub game_id: Option<String>,
    pub git_sha: String,
    pub git_dirty: bool,
    pub seed: u64,
    pub scenario_name: String,
    pub scenario_params: serde_json::Value,
    pub strategies: Vec<String>,
    pub rounds_played: u32,
    pub wall_time_ms: u64,
    pub outcome: Option<String>,
    pub result: Option<TerminalResult>,
    pub summary_metrics: Option<SummaryMetrics>,
    pub metrics_path: String,
    pub events_path: Option<String>,
    pub error_message: Option<String>,
}

/// Headline numbers for one finished game.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryMetrics {
    pub rounds_played: u32,
    pub final_entropy: u8,
    pub requests_handled: u64,
    pub requests_dropped: u64,
    pub overloads: u64,
    pub cascade_failures: u64,
    pub avg_uptime: f64,
    pub min_uptime: f64,
    pub services_built: u32,
    pub services_lost: u32,
    pub resource_starvation: u32,
    pub chaos_events: u64,
    pub strategy_timeouts: u32,
    pub actions_rejected: u64,
    pub cooperative_win: bool,
}

impl SummaryMetrics {
    pub fn from_final(state: &GameState, last: &RoundMetrics) -> Self {
        Self {
            rounds_played: state.round,
            final_entropy: state.entropy,
            requests_handled: last.requests_handled,
            requests_dropped: last.requests_dropped,
            overloads: last.overloads,
            cascade_failures: last.cascade_failures,
            avg_uptime: last.avg_uptime,
            min_uptime: last.min_uptime,
            services_built: last.services_built,
            services_lost: last.services_lost,
            resource_starvation: last.resource_starvation,
            chaos_events: last.chaos_events,
            strategy_timeouts: state.metrics.strategy_timeouts,
            actions_rejected: state.metrics.actions_rejected,
            cooperative_win: matches!(state.result, Some(TerminalResult::CooperativeWin { .. })),
        }
    }
}

impl RunResult {
    /// Write JSON atomically: write to `.tmp` then rename.
    pub fn write_atomic(&self, path: &Path) -> anyhow::Result<()> {
        write_json_atomic(self, path)
    }
}

pub fn write_json_atomic(value: &impl Serialize, path: &Path) -> anyhow::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value)?;
    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn git_sha() -> String {
    env!("PERIL_GIT_SHA").to_string()
}

pub fn git_dirty() -> bool {
    env!("PERIL_GIT_DIRTY") == "true"
}
