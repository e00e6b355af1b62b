//! Game configuration: every tunable the engine reads lives here.
//!
//! Configs deserialize with per-field defaults, so scenario files only need
//! to name what they change. `validate()` runs before Setup and rejects
//! anything the engine cannot start from.

use serde::{Deserialize, Serialize};

use crate::dice::Die;
use crate::error::ConfigError;
use crate::grid::HexCoord;
use crate::{Resources, Role, ServiceType};

pub const MAX_ENTROPY: u8 = 10;
/// Longest side a board may have.
pub const MAX_GRID_SIDE: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub seed: u64,
    pub grid_width: u32,
    pub grid_height: u32,
    pub max_rounds: u32,
    pub players: Vec<PlayerSetup>,
    pub rules: RuleConfig,
    pub catalog: ServiceCatalog,
    pub chaos: ChaosConfig,
    pub victory: VictoryCondition,
    /// Wall-clock budget for a single strategy decision.
    pub decision_deadline_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            grid_width: 8,
            grid_height: 6,
            max_rounds: 20,
            players: PlayerSetup::defaults(4),
            rules: RuleConfig::default(),
            catalog: ServiceCatalog::default(),
            chaos: ChaosConfig::default(),
            victory: VictoryCondition::default(),
            decision_deadline_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSetup {
    pub name: String,
    pub role: Role,
    /// Anchor cell for the starting layout; derived from the board when absent.
    #[serde(default)]
    pub home: Option<HexCoord>,
}

impl PlayerSetup {
    /// `count` players named "Player N", cycling through the roles.
    pub fn defaults(count: usize) -> Vec<PlayerSetup> {
        (0..count)
            .map(|i| PlayerSetup {
                name: format!("Player {}", i + 1),
                role: Role::ALL[i % Role::ALL.len()],
                home: None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub starting_resources: Resources,
    pub actions_per_round: u32,
    /// Services placed left-to-right from each player's home at Setup.
    pub starting_services: Vec<ServiceType>,
    pub require_adjacent_connections: bool,
    pub connection_cost: Resources,
    pub upgrade_cost: Resources,
    pub upgrade_capacity_bonus: u32,
    pub max_upgrades: u32,
    pub redundancy_cost: Resources,
    pub gather_amount: u32,
    pub autoscaler_cost: Resources,
    pub autoscaler_restore: u32,
    pub circuit_breaker_cost: Resources,
    pub profiler_cost: Resources,
    pub ability_dc: u8,
    pub debug: DebugDifficulty,
    pub traffic_dice: u8,
    pub traffic_die: Die,
    pub bugs_per_overload: u32,
    /// Weight of the newest observation in the uptime moving average.
    pub uptime_smoothing: f64,
    pub starting_uptime: f64,
    /// Rejected proposals tolerated per turn before a pass is forced.
    pub max_rejections_per_turn: u32,
    /// End the game early once every active player's uptime is at or below
    /// this line. Off when unset.
    pub collapse_uptime: Option<f64>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            starting_resources: Resources::new(5, 5, 5),
            actions_per_round: 3,
            starting_services: Vec::new(),
            require_adjacent_connections: true,
            connection_cost: Resources::new(0, 1, 0),
            upgrade_cost: Resources::new(1, 1, 1),
            upgrade_capacity_bonus: 2,
            max_upgrades: 3,
            redundancy_cost: Resources::new(1, 1, 1),
            gather_amount: 2,
            autoscaler_cost: Resources::new(1, 0, 0),
            autoscaler_restore: 2,
            circuit_breaker_cost: Resources::new(0, 1, 0),
            profiler_cost: Resources::new(0, 0, 1),
            ability_dc: 8,
            debug: DebugDifficulty::default(),
            traffic_dice: 2,
            traffic_die: Die::D10,
            bugs_per_overload: 1,
            uptime_smoothing: 0.5,
            starting_uptime: 100.0,
            max_rejections_per_turn: 3,
            collapse_uptime: None,
        }
    }
}

/// d20 difficulty classes per bug-severity tier, and the natural rolls at
/// or below which a failed fix makes things worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugDifficulty {
    pub low_dc: u8,
    pub medium_dc: u8,
    pub high_dc: u8,
    pub medium_escalation: u8,
    pub high_escalation: u8,
}

impl Default for DebugDifficulty {
    fn default() -> Self {
        Self {
            low_dc: 8,
            medium_dc: 12,
            high_dc: 16,
            medium_escalation: 2,
            high_escalation: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub cost: Resources,
    pub capacity: u32,
}

impl ServiceSpec {
    const fn new(cpu: u32, memory: u32, storage: u32, capacity: u32) -> Self {
        Self {
            cost: Resources::new(cpu, memory, storage),
            capacity,
        }
    }
}

/// Build cost and base capacity for every service type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceCatalog {
    pub compute: ServiceSpec,
    pub database: ServiceSpec,
    pub cache: ServiceSpec,
    pub queue: ServiceSpec,
    pub load_balancer: ServiceSpec,
    pub api_gateway: ServiceSpec,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self {
            compute: ServiceSpec::new(2, 2, 1, 5),
            database: ServiceSpec::new(1, 2, 3, 3),
            cache: ServiceSpec::new(1, 3, 1, 8),
            queue: ServiceSpec::new(1, 1, 2, 6),
            load_balancer: ServiceSpec::new(2, 1, 1, 10),
            api_gateway: ServiceSpec::new(1, 1, 1, 7),
        }
    }
}

impl ServiceCatalog {
    pub fn get(&self, service_type: ServiceType) -> &ServiceSpec {
        match service_type {
            ServiceType::Compute => &self.compute,
            ServiceType::Database => &self.database,
            ServiceType::Cache => &self.cache,
            ServiceType::Queue => &self.queue,
            ServiceType::LoadBalancer => &self.load_balancer,
            ServiceType::ApiGateway => &self.api_gateway,
        }
    }

    pub fn get_mut(&mut self, service_type: ServiceType) -> &mut ServiceSpec {
        match service_type {
            ServiceType::Compute => &mut self.compute,
            ServiceType::Database => &mut self.database,
            ServiceType::Cache => &mut self.cache,
            ServiceType::Queue => &mut self.queue,
            ServiceType::LoadBalancer => &mut self.load_balancer,
            ServiceType::ApiGateway => &mut self.api_gateway,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosConfig {
    /// Chaos can only fire while entropy is strictly above this.
    pub threshold: u8,
    pub probability: f64,
    /// Added after every Chaos phase, capped at `MAX_ENTROPY`.
    pub entropy_increment: u8,
    pub starting_entropy: u8,
    pub severe_entropy: u8,
    pub meltdown_entropy: u8,
    pub base_die: Die,
    pub severe_die: Die,
    pub meltdown_die: Die,
    /// Redundancy shields absorb hits only while this is on.
    pub mitigation: bool,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            probability: 1.0,
            entropy_increment: 1,
            starting_entropy: 0,
            severe_entropy: 7,
            meltdown_entropy: 10,
            base_die: Die::D8,
            severe_die: Die::D10,
            meltdown_die: Die::D12,
            mitigation: true,
        }
    }
}

impl ChaosConfig {
    /// Die rolled against the event table at the given entropy.
    pub fn die_for(&self, entropy: u8) -> Die {
        if entropy >= self.meltdown_entropy {
            self.meltdown_die
        } else if entropy >= self.severe_entropy {
            self.severe_die
        } else {
            self.base_die
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum VictoryCondition {
    Cooperative {
        uptime_threshold: f64,
        consecutive_rounds: u32,
    },
    Competitive,
    Survival {
        floor: f64,
        grace_rounds: u32,
    },
}

impl Default for VictoryCondition {
    fn default() -> Self {
        Self::cooperative()
    }
}

impl VictoryCondition {
    pub fn cooperative() -> Self {
        VictoryCondition::Cooperative {
            uptime_threshold: 80.0,
            consecutive_rounds: 3,
        }
    }

    pub fn survival() -> Self {
        VictoryCondition::Survival {
            floor: 25.0,
            grace_rounds: 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VictoryCondition::Cooperative { .. } => "cooperative",
            VictoryCondition::Competitive => "competitive",
            VictoryCondition::Survival { .. } => "survival",
        }
    }
}

impl GameConfig {
    /// Home cell for the player at `index`: explicit, or one of the four
    /// corner anchors that leave room for the starting layout.
    pub fn home_for(&self, index: usize) -> Option<HexCoord> {
        if let Some(home) = self.players.get(index).and_then(|p| p.home) {
            return Some(home);
        }
        let width = i32::try_from(self.grid_width).ok()?;
        let height = i32::try_from(self.grid_height).ok()?;
        let span = i32::try_from(self.rules.starting_services.len().max(1)).ok()?;
        let (top, bottom) = (1, height - 2);
        let (left, right) = (1, width - span);
        match index {
            0 => Some(HexCoord::new(top, left)),
            1 => Some(HexCoord::new(top, right)),
            2 => Some(HexCoord::new(bottom, left)),
            3 => Some(HexCoord::new(bottom, right)),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_width < 3 || self.grid_height < 3 {
            return Err(ConfigError::GridTooSmall {
                width: self.grid_width,
                height: self.grid_height,
            });
        }
        if self.grid_width > MAX_GRID_SIDE || self.grid_height > MAX_GRID_SIDE {
            return Err(ConfigError::GridTooLarge {
                width: self.grid_width,
                height: self.grid_height,
            });
        }
        if self.players.is_empty() {
            return Err(ConfigError::NoPlayers);
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::ZeroRounds);
        }
        if self.rules.actions_per_round == 0 {
            return Err(ConfigError::ZeroActions);
        }
        if self.rules.traffic_dice == 0 {
            return Err(ConfigError::NoTrafficDice);
        }
        self.validate_ranges()?;
        self.validate_layout()
    }

    fn validate_ranges(&self) -> Result<(), ConfigError> {
        let chaos = &self.chaos;
        if !(0.0..=1.0).contains(&chaos.probability) {
            return Err(ConfigError::OutOfRange {
                field: "chaos.probability",
                value: chaos.probability,
            });
        }
        for (field, value) in [
            ("chaos.threshold", chaos.threshold),
            ("chaos.starting_entropy", chaos.starting_entropy),
            ("chaos.entropy_increment", chaos.entropy_increment),
        ] {
            if value > MAX_ENTROPY {
                return Err(ConfigError::OutOfRange {
                    field,
                    value: f64::from(value),
                });
            }
        }
        let smoothing = self.rules.uptime_smoothing;
        if !(smoothing > 0.0 && smoothing <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "rules.uptime_smoothing",
                value: smoothing,
            });
        }
        if !(0.0..=100.0).contains(&self.rules.starting_uptime) {
            return Err(ConfigError::OutOfRange {
                field: "rules.starting_uptime",
                value: self.rules.starting_uptime,
            });
        }
        if let Some(line) = self.rules.collapse_uptime {
            if !(0.0..=100.0).contains(&line) {
                return Err(ConfigError::OutOfRange {
                    field: "rules.collapse_uptime",
                    value: line,
                });
            }
        }
        let uptime_field = match &self.victory {
            VictoryCondition::Cooperative {
                uptime_threshold, ..
            } => Some(("victory.uptime_threshold", *uptime_threshold)),
            VictoryCondition::Survival { floor, .. } => Some(("victory.floor", *floor)),
            VictoryCondition::Competitive => None,
        };
        if let Some((field, value)) = uptime_field {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::OutOfRange { field, value });
            }
        }
        Ok(())
    }

    fn validate_layout(&self) -> Result<(), ConfigError> {
        let span = i32::try_from(self.rules.starting_services.len().max(1))
            .map_err(|_| ConfigError::LayoutTooWide)?;
        let mut claimed: Vec<HexCoord> = Vec::new();
        for index in 0..self.players.len() {
            let home = self
                .home_for(index)
                .ok_or(ConfigError::MissingHome { player: index })?;
            for step in 0..span {
                let cell = home.shifted(step);
                let on_board = u32::try_from(cell.row).is_ok_and(|r| r < self.grid_height)
                    && u32::try_from(cell.col).is_ok_and(|c| c < self.grid_width);
                if !on_board {
                    return Err(ConfigError::HomeOutOfBounds {
                        player: index,
                        cell,
                    });
                }
                if claimed.contains(&cell) {
                    return Err(ConfigError::HomeOverlap {
                        player: index,
                        cell,
                    });
                }
                claimed.push(cell);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        GameConfig::default().validate().unwrap();
    }

    #[test]
    fn default_homes_fit_the_starting_layout() {
        let mut config = GameConfig::default();
        config.rules.starting_services = vec![
            ServiceType::Compute,
            ServiceType::Database,
            ServiceType::LoadBalancer,
        ];
        config.validate().unwrap();
        assert_eq!(config.home_for(1), Some(HexCoord::new(1, 5)));
        assert_eq!(config.home_for(3), Some(HexCoord::new(4, 5)));
    }

    #[test]
    fn fifth_player_needs_an_explicit_home() {
        let mut config = GameConfig::default();
        config.players = PlayerSetup::defaults(5);
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingHome { player: 4 })
        );
        config.players[4].home = Some(HexCoord::new(3, 3));
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_probability_and_empty_roster() {
        let mut config = GameConfig::default();
        config.chaos.probability = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "chaos.probability",
                ..
            })
        ));

        let mut config = GameConfig::default();
        config.players.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoPlayers));
    }

    #[test]
    fn rejects_oversized_grid() {
        let mut config = GameConfig::default();
        config.grid_width = 100_000;
        config.grid_height = 100_000;
        assert_eq!(
            config.validate(),
            Err(ConfigError::GridTooLarge {
                width: 100_000,
                height: 100_000,
            })
        );
        config.grid_width = MAX_GRID_SIDE;
        config.grid_height = 12;
        assert!(!matches!(config.validate(), Err(ConfigError::GridTooLarge { .. })));
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: GameConfig = serde_json::from_str(
            r#"{
                "seed": 9,
                "max_rounds": 10,
                "chaos": {"threshold": 5},
                "victory": {"mode": "survival", "floor": 30.0, "grace_rounds": 2}
            }"#,
        )
        .unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.chaos.threshold, 5);
        assert_eq!(config.chaos.entropy_increment, 1);
        assert_eq!(config.rules.actions_per_round, 3);
        assert_eq!(config.players.len(), 4);
        assert_eq!(config.victory.label(), "survival");
    }

    #[test]
    fn chaos_die_grows_with_entropy() {
        let chaos = ChaosConfig::default();
        assert_eq!(chaos.die_for(4), Die::D8);
        assert_eq!(chaos.die_for(7), Die::D10);
        assert_eq!(chaos.die_for(10), Die::D12);
    }
}
