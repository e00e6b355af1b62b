//! Rebuilds a game from its config and recorded decisions.

use std::collections::VecDeque;
use std::time::Duration;

use crate::config::GameConfig;
use crate::engine::Simulation;
use crate::error::{EngineError, StrategyError};
use crate::events::{Event, EventEnvelope};
use crate::strategy::{Decision, DecisionSource, PlayerView, Strategy};

/// Plays back a fixed queue of decision outcomes, then passes forever.
/// Recorded timeouts and disconnects are replayed as the same errors so the
/// engine books them exactly as it did the first time.
#[derive(Debug, Default, Clone)]
pub struct ScriptedStrategy {
    script: VecDeque<Result<Decision, StrategyError>>,
}

impl ScriptedStrategy {
    pub fn new(script: impl IntoIterator<Item = Decision>) -> Self {
        Self::from_outcomes(script.into_iter().map(Ok))
    }

    pub fn from_outcomes(script: impl IntoIterator<Item = Result<Decision, StrategyError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn decide(&mut self, _view: &PlayerView<'_>, _deadline: Duration) -> Result<Decision, StrategyError> {
        self.script.pop_front().unwrap_or(Ok(Decision::Pass))
    }
}

/// Per-seat decision scripts extracted from an event log.
///
/// Forced passes after too many rejections are left out: the replayed
/// rejections trigger them again. Timeouts carry the timings from their
/// `StrategyTimedOut` event.
pub fn decision_scripts(
    events: &[EventEnvelope],
    players: usize,
) -> Vec<Vec<Result<Decision, StrategyError>>> {
    let mut scripts = vec![Vec::new(); players];
    let mut timings: Vec<Option<(u64, u64)>> = vec![None; players];
    for envelope in events {
        match &envelope.event {
            Event::StrategyTimedOut {
                player,
                elapsed_ms,
                deadline_ms,
            } => {
                if let Some(slot) = timings.get_mut(player.index()) {
                    *slot = Some((*elapsed_ms, *deadline_ms));
                }
            }
            Event::DecisionMade {
                player,
                decision,
                source,
            } => {
                let Some(script) = scripts.get_mut(player.index()) else {
                    continue;
                };
                match source {
                    DecisionSource::Strategy => script.push(Ok(decision.clone())),
                    DecisionSource::Timeout => {
                        let (elapsed_ms, deadline_ms) = timings
                            .get_mut(player.index())
                            .and_then(Option::take)
                            .unwrap_or_default();
                        script.push(Err(StrategyError::Timeout {
                            elapsed_ms,
                            deadline_ms,
                        }));
                    }
                    DecisionSource::Disconnected => script.push(Err(StrategyError::Disconnected(
                        format!("{player} disconnected in the recorded game"),
                    ))),
                    DecisionSource::RejectionLimit => {}
                }
            }
            _ => {}
        }
    }
    scripts
}

/// Replays a recorded game to completion. The returned simulation's state
/// matches the original's for the same config.
pub fn replay_game(config: &GameConfig, events: &[EventEnvelope]) -> Result<Simulation, EngineError> {
    let strategies = decision_scripts(events, config.players.len())
        .into_iter()
        .map(|script| Box::new(ScriptedStrategy::from_outcomes(script)) as Box<dyn Strategy>)
        .collect();
    let mut sim = Simulation::new(config.clone(), strategies)?;
    sim.run()?;
    Ok(sim)
}
