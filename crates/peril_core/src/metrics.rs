//! Per-round metrics sampled from `GameState`.
//!
//! `compute_round_metrics` reads the state after a round's Chaos phase and
//! flattens it into one row for time-series analysis. No mutation, no IO.

use serde::{Deserialize, Serialize};

use crate::GameState;

/// Bump when fields are added, removed or reordered.
pub const METRICS_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundMetrics {
    pub round: u32,
    pub metrics_version: u32,
    pub entropy: u8,

    // Traffic, cumulative
    pub requests_handled: u64,
    pub requests_dropped: u64,
    pub overloads: u64,
    pub cascade_failures: u64,

    // Uptime across active players
    pub avg_uptime: f64,
    pub min_uptime: f64,
    pub active_players: u32,

    // Infrastructure
    pub services_alive: u32,
    pub connections_alive: u32,
    pub services_built: u32,
    pub services_lost: u32,
    pub total_bugs: u32,

    // Economy
    pub resources_total: u32,
    pub resource_starvation: u32,

    // Chaos
    pub chaos_events: u64,
    /// Label of the chaos event that fired this round, empty if none.
    pub chaos_this_round: String,
}

pub fn compute_round_metrics(state: &GameState) -> RoundMetrics {
    let metrics = &state.metrics;
    let uptimes: Vec<f64> = state.active_players().map(|p| p.uptime).collect();
    let avg_uptime = if uptimes.is_empty() {
        0.0
    } else {
        uptimes.iter().sum::<f64>() / uptimes.len() as f64
    };
    let min_uptime = uptimes.iter().copied().fold(None, |acc: Option<f64>, u| {
        Some(acc.map_or(u, |m| m.min(u)))
    });
    let chaos_this_round = metrics
        .chaos_log
        .last()
        .filter(|record| record.round == state.round)
        .map(|record| record.kind.label().to_string())
        .unwrap_or_default();

    RoundMetrics {
        round: state.round,
        metrics_version: METRICS_VERSION,
        entropy: state.entropy,
        requests_handled: metrics.requests_handled,
        requests_dropped: metrics.requests_dropped,
        overloads: metrics.overloads,
        cascade_failures: metrics.cascade_failures,
        avg_uptime,
        min_uptime: min_uptime.unwrap_or(0.0),
        active_players: count_u32(uptimes.len()),
        services_alive: count_u32(state.services.len()),
        connections_alive: count_u32(state.connections.len()),
        services_built: metrics.services_built,
        services_lost: metrics.services_lost,
        total_bugs: state.services.values().map(|s| s.bugs).sum(),
        resources_total: state.active_players().map(|p| p.resources.total()).sum(),
        resource_starvation: metrics.resource_starvation,
        chaos_events: metrics.chaos_events,
        chaos_this_round,
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
