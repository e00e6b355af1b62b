//! `peril_control` — strategies that sit in the players' seats.
//!
//! The engine only sees `Box<dyn Strategy>`; this crate supplies the
//! automated, adaptive and relayed implementations and builds them from
//! scenario configuration.

mod adaptive;
mod candidates;
mod relay;
mod rule_based;

use serde::{Deserialize, Serialize};

use peril_core::{ConfigError, Decision, PassStrategy, ScriptedStrategy, Strategy};

pub use adaptive::AdaptiveStrategy;
pub use candidates::{candidate_moves, BuildStyle, Move};
pub use relay::{relay_pair, RelayHandle, RelayMessage, RelayPrompt, RelayStrategy};
pub use rule_based::{PreferenceWeights, RuleBasedStrategy};

const DEFAULT_LEARNING_RATE: f64 = 0.2;

/// Strategy assignment as written in scenario files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyKind {
    Pass,
    RuleBased {
        #[serde(default)]
        weights: PreferenceWeights,
        #[serde(default)]
        style: BuildStyle,
    },
    Adaptive {
        #[serde(default = "default_learning_rate")]
        learning_rate: f64,
        #[serde(default)]
        style: BuildStyle,
    },
    Scripted {
        decisions: Vec<Decision>,
    },
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::RuleBased {
            weights: PreferenceWeights::default(),
            style: BuildStyle::default(),
        }
    }
}

impl StrategyKind {
    /// Short names accepted on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pass" => Some(StrategyKind::Pass),
            "rule" | "rule_based" => Some(StrategyKind::default()),
            "aggressive" => Some(StrategyKind::RuleBased {
                weights: PreferenceWeights::default(),
                style: BuildStyle::Aggressive,
            }),
            "adaptive" => Some(StrategyKind::Adaptive {
                learning_rate: DEFAULT_LEARNING_RATE,
                style: BuildStyle::default(),
            }),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Per-seat rng seed so seats never share a random stream.
fn seat_seed(game_seed: u64, seat: usize) -> u64 {
    let seat = seat as u64 + 1;
    game_seed ^ seat.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

pub fn build_strategy(kind: &StrategyKind, game_seed: u64, seat: usize) -> Box<dyn Strategy> {
    let seed = seat_seed(game_seed, seat);
    match kind {
        StrategyKind::Pass => Box::new(PassStrategy),
        StrategyKind::RuleBased { weights, style } => {
            Box::new(RuleBasedStrategy::new(*weights, *style, seed))
        }
        StrategyKind::Adaptive {
            learning_rate,
            style,
        } => Box::new(AdaptiveStrategy::new(*learning_rate, *style, seed)),
        StrategyKind::Scripted { decisions } => {
            Box::new(ScriptedStrategy::new(decisions.iter().cloned()))
        }
    }
}

/// One strategy per seat. A single entry is used for every seat.
pub fn build_strategies(
    kinds: &[StrategyKind],
    players: usize,
    game_seed: u64,
) -> Result<Vec<Box<dyn Strategy>>, ConfigError> {
    match kinds {
        [only] => Ok((0..players)
            .map(|seat| build_strategy(only, game_seed, seat))
            .collect()),
        _ if kinds.len() == players => Ok(kinds
            .iter()
            .enumerate()
            .map(|(seat, kind)| build_strategy(kind, game_seed, seat))
            .collect()),
        _ => Err(ConfigError::StrategyCount {
            expected: players,
            actual: kinds.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_kind_fills_every_seat() {
        let seats = build_strategies(&[StrategyKind::Pass], 4, 1).unwrap();
        assert_eq!(seats.len(), 4);
        assert!(seats.iter().all(|s| s.name() == "pass"));
    }

    #[test]
    fn mismatched_counts_are_rejected() {
        let kinds = vec![StrategyKind::Pass, StrategyKind::default()];
        let err = build_strategies(&kinds, 3, 1).err().unwrap();
        assert_eq!(
            err,
            ConfigError::StrategyCount {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn scenario_json_fills_defaults() {
        let kind: StrategyKind =
            serde_json::from_str(r#"{"kind": "rule_based", "weights": {"build": 9.0}}"#).unwrap();
        let StrategyKind::RuleBased { weights, style } = kind else {
            panic!("wrong kind");
        };
        assert!((weights.build - 9.0).abs() < 1e-12);
        assert!((weights.connect - PreferenceWeights::default().connect).abs() < 1e-12);
        assert_eq!(style, BuildStyle::Balanced);

        let adaptive: StrategyKind = serde_json::from_str(r#"{"kind": "adaptive"}"#).unwrap();
        assert_eq!(adaptive, StrategyKind::from_name("adaptive").unwrap());
    }

    #[test]
    fn seats_get_distinct_seeds() {
        assert_ne!(seat_seed(7, 0), seat_seed(7, 1));
        assert_eq!(seat_seed(7, 2), seat_seed(7, 2));
    }
}
