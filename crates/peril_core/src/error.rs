//! Error taxonomy.
//!
//! Validation errors are ordinary results handed back to the proposing
//! strategy. Everything wrapped by `EngineError` halts the game instance.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dice::Die;
use crate::grid::HexCoord;
use crate::invariants::InvariantViolation;
use crate::{ConnectionId, Phase, PlayerId, Resources, ServiceId, Tool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    ActionBudgetExhausted,
    InsufficientResources,
    InvalidTarget,
}

/// An illegal action. The state is untouched when one of these comes back.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("{player} has no actions left this round")]
    ActionBudgetExhausted { player: PlayerId },
    #[error("{player} needs {needed:?} but holds {available:?}")]
    InsufficientResources {
        player: PlayerId,
        needed: Resources,
        available: Resources,
    },
    #[error("invalid target: {0}")]
    InvalidTarget(TargetIssue),
}

impl ValidationError {
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            ValidationError::ActionBudgetExhausted { .. } => {
                ValidationErrorKind::ActionBudgetExhausted
            }
            ValidationError::InsufficientResources { .. } => {
                ValidationErrorKind::InsufficientResources
            }
            ValidationError::InvalidTarget(_) => ValidationErrorKind::InvalidTarget,
        }
    }
}

impl From<TargetIssue> for ValidationError {
    fn from(issue: TargetIssue) -> Self {
        ValidationError::InvalidTarget(issue)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TargetIssue {
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),
    #[error("{0} has been eliminated")]
    PlayerEliminated(PlayerId),
    #[error("cell {0} is off the board")]
    OutOfBounds(HexCoord),
    #[error("cell {0} is already occupied")]
    CellOccupied(HexCoord),
    #[error("unknown service {0}")]
    UnknownService(ServiceId),
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("{service} belongs to another player")]
    NotOwner { service: ServiceId },
    #[error("{0} cannot feed itself")]
    SelfConnection(ServiceId),
    #[error("{from} and {to} are not adjacent")]
    NotAdjacent { from: ServiceId, to: ServiceId },
    #[error("{from} already feeds {to}")]
    DuplicateConnection { from: ServiceId, to: ServiceId },
    #[error("{0} has no bugs")]
    NoBugs(ServiceId),
    #[error("{0} is at the upgrade limit")]
    UpgradeLimit(ServiceId),
    #[error("{0} is already at full capacity")]
    FullCapacity(ServiceId),
    #[error("{0} has no latency to clear")]
    NoServiceLatency(ServiceId),
    #[error("{0} has no latency to clear")]
    NoConnectionLatency(ConnectionId),
    #[error("{0:?} cannot act on that target")]
    WrongToolTarget(Tool),
    #[error("ability already used this round")]
    AbilityUsed,
    #[error("this ability needs a target service")]
    MissingAbilityTarget,
    #[error("entropy is already zero")]
    EntropyFloor,
    #[error("dice roll {0} is outside 1..=20")]
    InvalidDiceRoll(u8),
}

/// Invariants broken after a phase. Never clamped, always surfaced.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("state inconsistent after {phase} phase of round {round}: {}", summarize(.violations))]
pub struct ConsistencyError {
    pub round: u32,
    pub phase: Phase,
    pub violations: Vec<InvariantViolation>,
}

fn summarize(violations: &[InvariantViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{die:?} roll of {roll} has no entry in the chaos table")]
pub struct ChaosTableLookupError {
    pub roll: u8,
    pub die: Die,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error("decision took {elapsed_ms} ms (deadline {deadline_ms} ms)")]
    Timeout { elapsed_ms: u64, deadline_ms: u64 },
    #[error("strategy disconnected: {0}")]
    Disconnected(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("grid {width}x{height} is too small (minimum 3x3)")]
    GridTooSmall { width: u32, height: u32 },
    #[error("grid {width}x{height} is too large (maximum side 1024)")]
    GridTooLarge { width: u32, height: u32 },
    #[error("at least one player is required")]
    NoPlayers,
    #[error("max_rounds must be > 0")]
    ZeroRounds,
    #[error("actions_per_round must be > 0")]
    ZeroActions,
    #[error("traffic_dice must be > 0")]
    NoTrafficDice,
    #[error("{field} = {value} is out of range")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("starting layout is too wide")]
    LayoutTooWide,
    #[error("player {player} has no home cell; set one explicitly")]
    MissingHome { player: usize },
    #[error("player {player} starting layout leaves the board at {cell}")]
    HomeOutOfBounds { player: usize, cell: HexCoord },
    #[error("player {player} starting layout overlaps another at {cell}")]
    HomeOverlap { player: usize, cell: HexCoord },
    #[error("{actual} strategies supplied for {expected} players")]
    StrategyCount { expected: usize, actual: usize },
}

/// Fatal to one game instance; a batch carries on with the others.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
    #[error(transparent)]
    ChaosTable(#[from] ChaosTableLookupError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_one_to_one() {
        let budget = ValidationError::ActionBudgetExhausted {
            player: PlayerId(0),
        };
        let target: ValidationError = TargetIssue::NoBugs(ServiceId(3)).into();
        assert_eq!(budget.kind(), ValidationErrorKind::ActionBudgetExhausted);
        assert_eq!(target.kind(), ValidationErrorKind::InvalidTarget);
        assert_eq!(target.to_string(), "invalid target: svc_0003 has no bugs");
    }

    #[test]
    fn consistency_error_lists_violations() {
        let err = ConsistencyError {
            round: 4,
            phase: Phase::Chaos,
            violations: vec![InvariantViolation::EntropyOutOfRange { entropy: 11 }],
        };
        let message = err.to_string();
        assert!(message.contains("chaos phase of round 4"));
        assert!(message.contains("entropy 11"));
    }
}
