//! Owned, frozen export of a game. Field names here are the contract with
//! every downstream consumer (reports, renderers, persistence).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grid::HexCoord;
use crate::{
    Connection, GameState, Metrics, Phase, PlayerId, Resources, Role, Service, ServiceId,
    TerminalResult,
};

/// Bump when fields are added, removed or renamed.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub snapshot_version: u32,
    pub game_id: Uuid,
    pub round: u32,
    pub phase: Phase,
    pub entropy: u8,
    pub players: Vec<PlayerSnapshot>,
    pub grid_occupancy: Vec<CellOccupancy>,
    pub services: Vec<Service>,
    pub connections: Vec<Connection>,
    pub metrics: Metrics,
    pub result: Option<TerminalResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    pub resources: Resources,
    pub uptime: f64,
    pub actions_remaining: u32,
    pub eliminated: bool,
    pub services: Vec<ServiceId>,
    pub requests_handled: u64,
    pub requests_dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOccupancy {
    pub cell: HexCoord,
    pub service: ServiceId,
    pub owner: PlayerId,
}

impl GameSnapshot {
    pub fn capture(state: &GameState) -> Self {
        let players = state
            .players
            .iter()
            .map(|p| PlayerSnapshot {
                id: p.id,
                name: p.name.clone(),
                role: p.role,
                resources: p.resources,
                uptime: p.uptime,
                actions_remaining: p.actions_remaining,
                eliminated: p.eliminated,
                services: p.services.clone(),
                requests_handled: p.requests_handled,
                requests_dropped: p.requests_dropped,
            })
            .collect();
        let grid_occupancy = state
            .grid
            .occupied()
            .into_iter()
            .filter_map(|(cell, service)| {
                state.service(service).map(|s| CellOccupancy {
                    cell,
                    service,
                    owner: s.owner,
                })
            })
            .collect();
        Self {
            snapshot_version: SNAPSHOT_VERSION,
            game_id: state.meta.game_id,
            round: state.round,
            phase: state.phase,
            entropy: state.entropy,
            players,
            grid_occupancy,
            services: state.services.values().cloned().collect(),
            connections: state.connections.values().cloned().collect(),
            metrics: state.metrics.clone(),
            result: state.result.clone(),
        }
    }
}
