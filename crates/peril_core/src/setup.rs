use std::collections::BTreeMap;

use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::dice::Dice;
use crate::error::ConfigError;
use crate::grid::Grid;
use crate::{
    Counters, GameState, MetaState, Metrics, Phase, Player, PlayerId, VictoryTracker,
};

/// Bump when `GameState` changes shape.
pub const SCHEMA_VERSION: u32 = 1;

/// Generate a deterministic v4-format UUID from a seeded RNG.
pub fn generate_uuid(rng: &mut impl Rng) -> Uuid {
    let bytes: [u8; 16] = rng.gen();
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

/// Builds round 1 of a new game: validated config, seated players, and any
/// configured starting layout placed at each player's home anchor.
pub fn new_game(config: &GameConfig, dice: &mut Dice) -> Result<GameState, ConfigError> {
    config.validate()?;
    let game_id = generate_uuid(dice.rng_mut());

    let mut players = Vec::with_capacity(config.players.len());
    for (index, setup) in config.players.iter().enumerate() {
        let home = config
            .home_for(index)
            .ok_or(ConfigError::MissingHome { player: index })?;
        players.push(Player {
            id: PlayerId(u32::try_from(index).map_err(|_| ConfigError::NoPlayers)?),
            name: setup.name.clone(),
            role: setup.role,
            resources: config.rules.starting_resources,
            services: Vec::new(),
            uptime: config.rules.starting_uptime,
            uptime_history: Vec::new(),
            actions_remaining: 0,
            ability_used: false,
            eliminated: false,
            home,
            requests_handled: 0,
            requests_dropped: 0,
        });
    }

    let mut state = GameState {
        meta: MetaState {
            game_id,
            seed: dice.seed(),
            schema_version: SCHEMA_VERSION,
        },
        round: 1,
        phase: Phase::Setup,
        entropy: config.chaos.starting_entropy,
        players,
        grid: Grid::new(config.grid_width, config.grid_height),
        services: BTreeMap::new(),
        connections: BTreeMap::new(),
        pending_traffic: None,
        metrics: Metrics::default(),
        victory: VictoryTracker::default(),
        result: None,
        counters: Counters::default(),
    };
    place_starting_layout(&mut state, config)?;
    debug!(%game_id, players = state.players.len(), "game set up");
    Ok(state)
}

fn place_starting_layout(state: &mut GameState, config: &GameConfig) -> Result<(), ConfigError> {
    let homes: Vec<(PlayerId, crate::HexCoord)> =
        state.players.iter().map(|p| (p.id, p.home)).collect();
    for (player, home) in homes {
        for (step, service_type) in (0i32..).zip(&config.rules.starting_services) {
            let cell = home.shifted(step);
            let capacity = config.catalog.get(*service_type).capacity;
            state
                .insert_service(player, *service_type, cell, capacity)
                .ok_or(ConfigError::HomeOverlap {
                    player: player.index(),
                    cell,
                })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{check_invariants, HexCoord, ServiceType};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn deterministic_uuid_from_same_seed() {
        let id1 = generate_uuid(&mut ChaCha8Rng::seed_from_u64(42));
        let id2 = generate_uuid(&mut ChaCha8Rng::seed_from_u64(42));
        assert_eq!(id1, id2);
        assert_eq!(id1.get_version(), Some(uuid::Version::Random));
        assert_ne!(id1, generate_uuid(&mut ChaCha8Rng::seed_from_u64(99)));
    }

    #[test]
    fn seats_players_with_starting_pools() {
        let config = GameConfig::default();
        let state = new_game(&config, &mut Dice::from_seed(5)).unwrap();
        assert_eq!(state.round, 1);
        assert_eq!(state.players.len(), 4);
        assert!(state.services.is_empty());
        for (i, player) in state.players.iter().enumerate() {
            assert_eq!(player.id.index(), i);
            assert_eq!(player.resources, config.rules.starting_resources);
        }
    }

    #[test]
    fn starting_layout_lands_at_home_anchors() {
        let mut config = GameConfig::default();
        config.rules.starting_services = vec![
            ServiceType::Compute,
            ServiceType::Database,
            ServiceType::LoadBalancer,
        ];
        let state = new_game(&config, &mut Dice::from_seed(5)).unwrap();
        assert_eq!(state.services.len(), 12);
        assert_eq!(state.players[1].home, HexCoord::new(1, 5));
        let first = state.services_of(PlayerId(1))[0];
        assert_eq!(first.location, HexCoord::new(1, 5));
        assert_eq!(first.service_type, ServiceType::Compute);
        assert!(check_invariants(&state).is_empty());
    }

    #[test]
    fn invalid_config_is_rejected_before_round_one() {
        let config = GameConfig {
            max_rounds: 0,
            ..GameConfig::default()
        };
        assert_eq!(
            new_game(&config, &mut Dice::from_seed(1)).unwrap_err(),
            ConfigError::ZeroRounds
        );
    }
}
