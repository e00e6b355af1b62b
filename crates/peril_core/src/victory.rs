//! Victory bookkeeping (Resolution phase) and the pure terminal evaluator.

use tracing::info;

use crate::config::{GameConfig, VictoryCondition};
use crate::{GameState, PlayerId, TerminalResult};

/// Competitive scores this close are a shared win.
const SCORE_TIE_EPSILON: f64 = 1e-9;

/// Updates the cooperative streak and applies survival eliminations.
/// Returns the players eliminated this round.
pub fn update_standings(state: &mut GameState, config: &GameConfig) -> Vec<PlayerId> {
    match config.victory {
        VictoryCondition::Cooperative {
            uptime_threshold, ..
        } => {
            let holding = state.active_players().next().is_some()
                && state
                    .active_players()
                    .all(|p| p.uptime >= uptime_threshold);
            state.victory.cooperative_streak = if holding {
                state.victory.cooperative_streak + 1
            } else {
                0
            };
            Vec::new()
        }
        VictoryCondition::Survival {
            floor,
            grace_rounds,
        } => eliminate_below(state, floor, grace_rounds),
        VictoryCondition::Competitive => Vec::new(),
    }
}

fn eliminate_below(state: &mut GameState, floor: f64, grace_rounds: u32) -> Vec<PlayerId> {
    if state.round <= grace_rounds {
        return Vec::new();
    }
    let anyone_standing = state.active_players().any(|p| p.uptime >= floor);
    if !anyone_standing {
        return Vec::new();
    }
    let mut eliminated = Vec::new();
    for player in state.players.iter_mut().filter(|p| p.is_active()) {
        if player.uptime < floor {
            player.eliminated = true;
            player.actions_remaining = 0;
            eliminated.push(player.id);
            info!(player = %player.id, uptime = player.uptime, "player eliminated");
        }
    }
    eliminated
}

/// Terminal verdict for the current state, if any. Pure and idempotent.
pub fn evaluate(state: &GameState, config: &GameConfig) -> Option<TerminalResult> {
    let round = state.round;
    let active: Vec<PlayerId> = state.active_players().map(|p| p.id).collect();

    match config.victory {
        VictoryCondition::Cooperative {
            consecutive_rounds, ..
        } => {
            if !active.is_empty() && state.victory.cooperative_streak >= consecutive_rounds {
                return Some(TerminalResult::CooperativeWin {
                    round,
                    players: active,
                });
            }
        }
        VictoryCondition::Survival { .. } => {
            if state.players.len() >= 2 && active.len() == 1 {
                return Some(TerminalResult::SurvivalWin {
                    round,
                    winner: active[0],
                });
            }
        }
        VictoryCondition::Competitive => {}
    }

    if let Some(line) = config.rules.collapse_uptime {
        let collapsed = !active.is_empty()
            && active
                .iter()
                .filter_map(|id| state.player(*id))
                .all(|p| p.uptime <= line);
        if collapsed {
            return Some(TerminalResult::Collapse { round });
        }
    }

    if round < config.max_rounds {
        return None;
    }
    if matches!(config.victory, VictoryCondition::Competitive) {
        return Some(competitive_verdict(state));
    }
    Some(TerminalResult::Timeout { round })
}

/// Uptime times cumulative handled requests; highest positive score wins.
pub fn competitive_score(state: &GameState, player: PlayerId) -> f64 {
    state
        .player(player)
        .map_or(0.0, |p| p.uptime * p.requests_handled as f64)
}

fn competitive_verdict(state: &GameState) -> TerminalResult {
    let scores: Vec<(PlayerId, f64)> = state
        .active_players()
        .map(|p| (p.id, competitive_score(state, p.id)))
        .collect();
    let best = scores.iter().map(|(_, s)| *s).fold(0.0, f64::max);
    if best <= 0.0 {
        return TerminalResult::Timeout { round: state.round };
    }
    let winners = scores
        .into_iter()
        .filter(|(_, s)| (best - s).abs() <= SCORE_TIE_EPSILON * best.max(1.0))
        .map(|(id, _)| id)
        .collect();
    TerminalResult::CompetitiveWin {
        round: state.round,
        winners,
        score: best,
    }
}
