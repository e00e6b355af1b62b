//! Ordered event log. Together with the config it is enough to rebuild a
//! game: every strategy decision is recorded, and everything else follows
//! from the seeded dice.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actions::{Action, ActionOutcome};
use crate::chaos::ChaosEvent;
use crate::error::ValidationErrorKind;
use crate::strategy::{Decision, DecisionSource};
use crate::traffic::{CascadeChain, Overload, TrafficRoll};
use crate::{EventId, Phase, PlayerId, TerminalResult};

/// Logical timestamp: round, phase, and position within the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub round: u32,
    pub phase: Phase,
    pub seq: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub at: Stamp,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    GameStarted {
        game_id: Uuid,
        seed: u64,
        players: Vec<PlayerId>,
    },
    TrafficRolled {
        rolls: Vec<TrafficRoll>,
    },
    DecisionMade {
        player: PlayerId,
        decision: Decision,
        source: DecisionSource,
    },
    ActionApplied {
        player: PlayerId,
        action: Action,
        outcome: ActionOutcome,
    },
    ActionRejected {
        player: PlayerId,
        action: Action,
        error_kind: ValidationErrorKind,
        reason: String,
    },
    StrategyTimedOut {
        player: PlayerId,
        elapsed_ms: u64,
        deadline_ms: u64,
    },
    ForcedPass {
        player: PlayerId,
        rejections: u32,
    },
    ServiceOverloaded {
        overload: Overload,
    },
    CascadeTriggered {
        chain: CascadeChain,
    },
    RoundResolved {
        handled: u64,
        dropped: u64,
        uptime: Vec<f64>,
    },
    ChaosChecked {
        entropy: u8,
        threshold: u8,
        triggered: bool,
    },
    ChaosStruck {
        chaos: ChaosEvent,
    },
    EntropyChanged {
        from: u8,
        to: u8,
    },
    PlayerEliminated {
        player: PlayerId,
        uptime: f64,
    },
    GameEnded {
        result: TerminalResult,
    },
}

impl Event {
    pub fn label(&self) -> &'static str {
        match self {
            Event::GameStarted { .. } => "game_started",
            Event::TrafficRolled { .. } => "traffic_rolled",
            Event::DecisionMade { .. } => "decision_made",
            Event::ActionApplied { .. } => "action_applied",
            Event::ActionRejected { .. } => "action_rejected",
            Event::StrategyTimedOut { .. } => "strategy_timed_out",
            Event::ForcedPass { .. } => "forced_pass",
            Event::ServiceOverloaded { .. } => "service_overloaded",
            Event::CascadeTriggered { .. } => "cascade_triggered",
            Event::RoundResolved { .. } => "round_resolved",
            Event::ChaosChecked { .. } => "chaos_checked",
            Event::ChaosStruck { .. } => "chaos_struck",
            Event::EntropyChanged { .. } => "entropy_changed",
            Event::PlayerEliminated { .. } => "player_eliminated",
            Event::GameEnded { .. } => "game_ended",
        }
    }
}
