//! Shared test fixtures for peril_core and downstream crates.
//!
//! `base_config()` is the reference table setup: 8x6 board, four players
//! (one per role), {5,5,5} resources, chaos threshold 3, ten rounds.

use crate::config::{GameConfig, ServiceCatalog};
use crate::dice::Dice;
use crate::grid::HexCoord;
use crate::setup::new_game;
use crate::{GameState, Phase, PlayerId, ServiceId, ServiceType};

pub fn base_config() -> GameConfig {
    GameConfig {
        seed: 42,
        max_rounds: 10,
        ..GameConfig::default()
    }
}

/// Round 1, Setup phase, nothing built, empty action budgets.
pub fn base_state(config: &GameConfig) -> GameState {
    new_game(config, &mut Dice::from_seed(config.seed)).expect("fixture config is valid")
}

/// Like `base_state`, but in the Action phase with full budgets.
pub fn ready_state(config: &GameConfig) -> GameState {
    let mut state = base_state(config);
    state.phase = Phase::Action;
    for player in &mut state.players {
        player.actions_remaining = config.rules.actions_per_round;
    }
    state
}

/// Places a service for free, with catalog capacity.
pub fn build_at(
    state: &mut GameState,
    owner: PlayerId,
    service_type: ServiceType,
    cell: HexCoord,
) -> ServiceId {
    let capacity = ServiceCatalog::default().get(service_type).capacity;
    state
        .insert_service(owner, service_type, cell, capacity)
        .expect("fixture cell is free")
}
