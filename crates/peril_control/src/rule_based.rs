use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use peril_core::{ActionFeedback, Decision, PlayerView, Strategy, StrategyError};

use crate::candidates::{candidate_moves, choose, BuildStyle, Move};

/// Relative appetite for each move category. Zero disables a category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceWeights {
    pub build: f64,
    pub connect: f64,
    pub upgrade: f64,
    pub debug: f64,
    pub redundancy: f64,
    pub gather: f64,
    pub tool: f64,
    pub ability: f64,
}

impl Default for PreferenceWeights {
    fn default() -> Self {
        Self {
            build: 3.0,
            connect: 2.5,
            upgrade: 1.0,
            debug: 2.0,
            redundancy: 1.0,
            gather: 0.5,
            tool: 1.5,
            ability: 1.0,
        }
    }
}

impl PreferenceWeights {
    pub fn get(&self, kind: Move) -> f64 {
        match kind {
            Move::Build => self.build,
            Move::Connect => self.connect,
            Move::Upgrade => self.upgrade,
            Move::Debug => self.debug,
            Move::Redundancy => self.redundancy,
            Move::Gather => self.gather,
            Move::Tool => self.tool,
            Move::Ability => self.ability,
        }
    }

    pub fn get_mut(&mut self, kind: Move) -> &mut f64 {
        match kind {
            Move::Build => &mut self.build,
            Move::Connect => &mut self.connect,
            Move::Upgrade => &mut self.upgrade,
            Move::Debug => &mut self.debug,
            Move::Redundancy => &mut self.redundancy,
            Move::Gather => &mut self.gather,
            Move::Tool => &mut self.tool,
            Move::Ability => &mut self.ability,
        }
    }
}

/// Fixed-preference automated player:
/// 1. Propose one valid, affordable action per move category.
/// 2. Skip categories rejected earlier this round.
/// 3. Draw one by weight from its own seeded rng; pass when nothing is left.
pub struct RuleBasedStrategy {
    weights: PreferenceWeights,
    style: BuildStyle,
    rng: ChaCha8Rng,
    blocked: Vec<Move>,
    last: Option<Move>,
}

impl RuleBasedStrategy {
    pub fn new(weights: PreferenceWeights, style: BuildStyle, seed: u64) -> Self {
        Self {
            weights,
            style,
            rng: ChaCha8Rng::seed_from_u64(seed),
            blocked: Vec::new(),
            last: None,
        }
    }

    pub fn weights(&self) -> &PreferenceWeights {
        &self.weights
    }
}

impl Strategy for RuleBasedStrategy {
    fn name(&self) -> &str {
        "rule_based"
    }

    fn decide(&mut self, view: &PlayerView<'_>, _deadline: Duration) -> Result<Decision, StrategyError> {
        if view.actions_remaining() == 0 {
            return Ok(Decision::Pass);
        }
        let candidates = candidate_moves(view, self.style);
        let blocked = &self.blocked;
        let weights = &self.weights;
        let picked = choose(&mut self.rng, candidates, |kind| {
            if blocked.contains(&kind) {
                0.0
            } else {
                weights.get(kind)
            }
        });
        self.last = picked.as_ref().map(|(kind, _)| *kind);
        Ok(picked.map_or(Decision::Pass, |(kind, action)| {
            trace!(player = %view.player, ?kind, "rule-based pick");
            Decision::act(action)
        }))
    }

    fn observe(&mut self, feedback: &ActionFeedback) {
        if feedback.result.success {
            return;
        }
        if let Some(kind) = self.last {
            self.blocked.push(kind);
        }
    }

    fn round_finished(&mut self, _view: &PlayerView<'_>) {
        self.blocked.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peril_core::test_fixtures::{base_config, ready_state};
    use peril_core::{Action, ActionResult, PlayerId};

    #[test]
    fn only_gather_enabled_always_gathers() {
        let config = base_config();
        let state = ready_state(&config);
        let weights = PreferenceWeights {
            build: 0.0,
            ..PreferenceWeights::default()
        };
        let mut strategy = RuleBasedStrategy::new(weights, BuildStyle::Balanced, 3);
        let view = PlayerView::new(PlayerId(0), &state, &config);
        let decision = strategy.decide(&view, Duration::from_secs(1)).unwrap();
        assert!(matches!(
            decision,
            Decision::Act {
                action: Action::Gather { .. },
                ..
            }
        ));
    }

    #[test]
    fn rejected_category_is_skipped_until_round_end() {
        let config = base_config();
        let state = ready_state(&config);
        let weights = PreferenceWeights {
            gather: 0.0,
            ..PreferenceWeights::default()
        };
        let mut strategy = RuleBasedStrategy::new(weights, BuildStyle::Balanced, 3);
        let view = PlayerView::new(PlayerId(0), &state, &config);
        let deadline = Duration::from_secs(1);

        let Decision::Act { action, .. } = strategy.decide(&view, deadline).unwrap() else {
            panic!("expected a build");
        };
        strategy.observe(&ActionFeedback {
            player: PlayerId(0),
            action,
            result: ActionResult {
                success: false,
                error_kind: None,
                error: Some("cell occupied".into()),
                delta: Vec::new(),
                dice: Vec::new(),
            },
        });
        assert_eq!(strategy.decide(&view, deadline).unwrap(), Decision::Pass);

        strategy.round_finished(&view);
        assert_ne!(strategy.decide(&view, deadline).unwrap(), Decision::Pass);
    }
}
