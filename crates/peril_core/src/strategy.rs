use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::actions::{Action, ActionResult};
use crate::config::GameConfig;
use crate::error::StrategyError;
use crate::{GameState, Player, PlayerId, Service};

/// Decision-maker for one seat at the table. The engine only ever sees
/// `Box<dyn Strategy>`; rule-based, adaptive, relayed and scripted policies
/// live outside the core.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Picks the next move. Called repeatedly during the Action phase until
    /// the player passes or runs out of budget.
    fn decide(&mut self, view: &PlayerView<'_>, deadline: Duration)
        -> Result<Decision, StrategyError>;

    /// Outcome of the last decided action, accepted or not.
    fn observe(&mut self, _feedback: &ActionFeedback) {}

    /// Called once per player after every Resolution phase.
    fn round_finished(&mut self, _view: &PlayerView<'_>) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Act {
        #[serde(flatten)]
        action: Action,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dice_rolls: Option<Vec<u8>>,
    },
    Pass,
}

impl Decision {
    pub fn act(action: Action) -> Self {
        Decision::Act {
            action,
            dice_rolls: None,
        }
    }
}

/// Why a decision was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Strategy,
    /// Deadline missed; the rest of the budget is passed.
    Timeout,
    /// Too many rejections in one turn.
    RejectionLimit,
    /// The strategy could not be reached; treated like a timeout.
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFeedback {
    pub player: PlayerId,
    pub action: Action,
    pub result: ActionResult,
}

/// Read-only window onto the game for one player's strategy.
#[derive(Debug, Clone, Copy)]
pub struct PlayerView<'a> {
    pub player: PlayerId,
    pub state: &'a GameState,
    pub config: &'a GameConfig,
}

impl<'a> PlayerView<'a> {
    pub fn new(player: PlayerId, state: &'a GameState, config: &'a GameConfig) -> Self {
        Self {
            player,
            state,
            config,
        }
    }

    pub fn me(&self) -> Option<&'a Player> {
        self.state.player(self.player)
    }

    pub fn my_services(&self) -> Vec<&'a Service> {
        self.state.services_of(self.player)
    }

    pub fn actions_remaining(&self) -> u32 {
        self.me().map_or(0, |p| p.actions_remaining)
    }
}

/// Always passes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassStrategy;

impl Strategy for PassStrategy {
    fn name(&self) -> &str {
        "pass"
    }

    fn decide(&mut self, _view: &PlayerView<'_>, _deadline: Duration) -> Result<Decision, StrategyError> {
        Ok(Decision::Pass)
    }
}
