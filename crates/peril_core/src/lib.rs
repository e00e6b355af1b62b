//! `peril_core` — deterministic turn-based engine for Pipeline & Peril.
//!
//! No IO, no network. All randomness via the game's own seeded `Dice`.

mod actions;
mod chaos;
mod config;
mod dice;
mod engine;
mod error;
mod events;
mod grid;
mod invariants;
pub mod metrics;
mod replay;
mod setup;
mod snapshot;
mod state;
mod strategy;
mod traffic;
mod types;
mod victory;

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;

pub use actions::{
    apply, debug_difficulty, submit, Action, ActionOutcome, ActionRequest, ActionResult,
    BugSeverity, CheckResult, Delta, ToolTarget,
};
pub use chaos::{apply_decay, maybe_trigger, ChaosEffect, ChaosEvent, ChaosKind, Severity};
pub use config::{
    ChaosConfig, DebugDifficulty, GameConfig, PlayerSetup, RuleConfig, ServiceCatalog,
    ServiceSpec, VictoryCondition, MAX_ENTROPY, MAX_GRID_SIDE,
};
pub use dice::{Dice, Die, PresetRolls, Roller};
pub use engine::{next_phase, Simulation};
pub use error::{
    ChaosTableLookupError, ConfigError, ConsistencyError, EngineError, StrategyError,
    TargetIssue, ValidationError, ValidationErrorKind,
};
pub use events::{Event, EventEnvelope, Stamp};
pub use grid::{Grid, HexCoord};
pub use invariants::{check_invariants, InvariantViolation};
pub use metrics::{compute_round_metrics, RoundMetrics};
pub use replay::{decision_scripts, replay_game, ScriptedStrategy};
pub use setup::{generate_uuid, new_game, SCHEMA_VERSION};
pub use snapshot::{CellOccupancy, GameSnapshot, PlayerSnapshot, SNAPSHOT_VERSION};
pub use strategy::{
    ActionFeedback, Decision, DecisionSource, PassStrategy, PlayerView, Strategy,
};
pub use traffic::{
    resolve_round, roll_traffic, CascadeChain, Overload, PlayerTraffic, ResolutionReport,
    TrafficRoll,
};
pub use types::*;
pub use victory::{competitive_score, evaluate, update_standings};

pub(crate) fn emit(counters: &mut Counters, at: Stamp, event: Event) -> EventEnvelope {
    let id = EventId(counters.next_event_id);
    counters.next_event_id += 1;
    EventEnvelope { id, at, event }
}
