use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use peril_core::{ActionFeedback, Decision, PlayerView, Strategy, StrategyError};

use crate::candidates::{candidate_moves, choose, BuildStyle, Move};
use crate::rule_based::PreferenceWeights;

const MIN_WEIGHT: f64 = 0.05;
const MAX_WEIGHT: f64 = 20.0;

/// Rule-based player whose weights drift with results.
///
/// Categories used in a round where uptime held or improved are scaled up
/// by `1 + learning_rate`; after a worse round they are scaled down. A
/// rejection scales its category down immediately.
pub struct AdaptiveStrategy {
    weights: PreferenceWeights,
    learning_rate: f64,
    style: BuildStyle,
    rng: ChaCha8Rng,
    used: Vec<Move>,
    blocked: Vec<Move>,
    last: Option<Move>,
    last_uptime: Option<f64>,
}

impl AdaptiveStrategy {
    pub fn new(learning_rate: f64, style: BuildStyle, seed: u64) -> Self {
        Self {
            weights: PreferenceWeights::default(),
            learning_rate: learning_rate.clamp(0.0, 0.9),
            style,
            rng: ChaCha8Rng::seed_from_u64(seed),
            used: Vec::new(),
            blocked: Vec::new(),
            last: None,
            last_uptime: None,
        }
    }

    pub fn weights(&self) -> &PreferenceWeights {
        &self.weights
    }

    fn scale(&mut self, kind: Move, factor: f64) {
        let weight = self.weights.get_mut(kind);
        *weight = (*weight * factor).clamp(MIN_WEIGHT, MAX_WEIGHT);
    }
}

impl Strategy for AdaptiveStrategy {
    fn name(&self) -> &str {
        "adaptive"
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
        Ok(picked.map_or(Decision::Pass, |(_, action)| Decision::act(action)))
    }

    fn observe(&mut self, feedback: &ActionFeedback) {
        let Some(kind) = self.last else {
            return;
        };
        if feedback.result.success {
            if !self.used.contains(&kind) {
                self.used.push(kind);
            }
        } else {
            self.blocked.push(kind);
            self.scale(kind, 1.0 - self.learning_rate);
        }
    }

    fn round_finished(&mut self, view: &PlayerView<'_>) {
        let Some(me) = view.me() else {
            return;
        };
        let baseline = self
            .last_uptime
            .unwrap_or(view.config.rules.starting_uptime);
        let factor = if me.uptime >= baseline {
            1.0 + self.learning_rate
        } else {
            1.0 - self.learning_rate
        };
        for kind in std::mem::take(&mut self.used) {
            self.scale(kind, factor);
        }
        debug!(player = %view.player, uptime = me.uptime, factor, "adaptive weights updated");
        self.last_uptime = Some(me.uptime);
        self.blocked.clear();
    }
}
