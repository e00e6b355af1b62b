//! Structural sanity checks run after every phase.
//!
//! A correct engine never trips these. When one does, the game instance is
//! aborted with a `ConsistencyError` instead of clamping the value back.

use thiserror::Error;

use crate::config::MAX_ENTROPY;
use crate::grid::HexCoord;
use crate::{ConnectionId, GameState, PlayerId, ServiceId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("grid cell vector does not match its dimensions")]
    MalformedGrid,
    #[error("cell {cell} indexes {indexed} but {actual:?} sits there")]
    CellMismatch {
        cell: HexCoord,
        indexed: ServiceId,
        actual: Option<ServiceId>,
    },
    #[error("{service} at {cell} is missing from the grid index")]
    UnindexedService { service: ServiceId, cell: HexCoord },
    #[error("{connection} references missing {service}")]
    DanglingConnection {
        connection: ConnectionId,
        service: ServiceId,
    },
    #[error("{service} lists unknown outbound {connection}")]
    UnknownOutbound {
        service: ServiceId,
        connection: ConnectionId,
    },
    #[error("{connection} is not listed by its source {service}")]
    UnlistedConnection {
        connection: ConnectionId,
        service: ServiceId,
    },
    #[error("{service} capacity {capacity} exceeds max {max_capacity}")]
    CapacityAboveMax {
        service: ServiceId,
        capacity: u32,
        max_capacity: u32,
    },
    #[error("{service} owner {owner} does not list it")]
    OrphanService { service: ServiceId, owner: PlayerId },
    #[error("{player} lists unknown {service}")]
    UnknownOwnedService { player: PlayerId, service: ServiceId },
    #[error("entropy {entropy} outside 0..=10")]
    EntropyOutOfRange { entropy: u8 },
    #[error("{player} uptime {uptime} outside 0..=100")]
    UptimeOutOfRange { player: PlayerId, uptime: f64 },
    #[error("{player} sits at turn position {position}")]
    MisplacedPlayer { player: PlayerId, position: usize },
    #[error("round counter is zero")]
    ZeroRound,
}

/// Returns every violated invariant; empty when the state is sound.
pub fn check_invariants(state: &GameState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    if state.round == 0 {
        violations.push(InvariantViolation::ZeroRound);
    }
    if state.entropy > MAX_ENTROPY {
        violations.push(InvariantViolation::EntropyOutOfRange {
            entropy: state.entropy,
        });
    }
    check_grid(state, &mut violations);
    check_services(state, &mut violations);
    check_connections(state, &mut violations);
    check_players(state, &mut violations);

    violations
}

fn check_grid(state: &GameState, violations: &mut Vec<InvariantViolation>) {
    if !state.grid.is_well_formed() {
        violations.push(InvariantViolation::MalformedGrid);
        return;
    }
    for (cell, indexed) in state.grid.occupied() {
        let actual = state
            .services
            .get(&indexed)
            .filter(|s| s.location == cell)
            .map(|s| s.id);
        if actual != Some(indexed) {
            violations.push(InvariantViolation::CellMismatch {
                cell,
                indexed,
                actual,
            });
        }
    }
}

fn check_services(state: &GameState, violations: &mut Vec<InvariantViolation>) {
    for service in state.services.values() {
        if state.grid.occupant(service.location) != Some(service.id) {
            violations.push(InvariantViolation::UnindexedService {
                service: service.id,
                cell: service.location,
            });
        }
        if service.capacity > service.max_capacity {
            violations.push(InvariantViolation::CapacityAboveMax {
                service: service.id,
                capacity: service.capacity,
                max_capacity: service.max_capacity,
            });
        }
        let listed = state
            .player(service.owner)
            .is_some_and(|p| p.services.contains(&service.id));
        if !listed {
            violations.push(InvariantViolation::OrphanService {
                service: service.id,
                owner: service.owner,
            });
        }
        for connection in &service.outbound {
            if !state.connections.contains_key(connection) {
                violations.push(InvariantViolation::UnknownOutbound {
                    service: service.id,
                    connection: *connection,
                });
            }
        }
    }
}

fn check_connections(state: &GameState, violations: &mut Vec<InvariantViolation>) {
    for connection in state.connections.values() {
        for endpoint in [connection.from, connection.to] {
            if !state.services.contains_key(&endpoint) {
                violations.push(InvariantViolation::DanglingConnection {
                    connection: connection.id,
                    service: endpoint,
                });
            }
        }
        let listed = state
            .services
            .get(&connection.from)
            .is_some_and(|s| s.outbound.contains(&connection.id));
        if !listed && state.services.contains_key(&connection.from) {
            violations.push(InvariantViolation::UnlistedConnection {
                connection: connection.id,
                service: connection.from,
            });
        }
    }
}

fn check_players(state: &GameState, violations: &mut Vec<InvariantViolation>) {
    for (position, player) in state.players.iter().enumerate() {
        if player.id.index() != position {
            violations.push(InvariantViolation::MisplacedPlayer {
                player: player.id,
                position,
            });
        }
        if !(0.0..=100.0).contains(&player.uptime) {
            violations.push(InvariantViolation::UptimeOutOfRange {
                player: player.id,
                uptime: player.uptime,
            });
        }
        for service in &player.services {
            if !state.services.contains_key(service) {
                violations.push(InvariantViolation::UnknownOwnedService {
                    player: player.id,
                    service: *service,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{base_config, base_state};
    use crate::{Connection, ServiceType};

    #[test]
    fn fresh_state_is_sound() {
        let state = base_state(&base_config());
        assert!(check_invariants(&state).is_empty());
    }

    #[test]
    fn detects_dangling_connection() {
        let mut state = base_state(&base_config());
        let a = state
            .insert_service(PlayerId(0), ServiceType::ApiGateway, HexCoord::new(1, 1), 7)
            .unwrap();
        state.connections.insert(
            ConnectionId(9),
            Connection {
                id: ConnectionId(9),
                from: a,
                to: ServiceId(77),
                latency: 0,
            },
        );
        let violations = check_invariants(&state);
        assert!(violations.contains(&InvariantViolation::DanglingConnection {
            connection: ConnectionId(9),
            service: ServiceId(77),
        }));
        assert!(violations.contains(&InvariantViolation::UnlistedConnection {
            connection: ConnectionId(9),
            service: a,
        }));
    }

    #[test]
    fn detects_out_of_range_scalars() {
        let mut state = base_state(&base_config());
        state.entropy = 11;
        state.players[2].uptime = f64::NAN;
        let violations = check_invariants(&state);
        assert_eq!(violations.len(), 2);
        assert!(violations
            .iter()
            .any(|v| matches!(v, InvariantViolation::UptimeOutOfRange { .. })));
    }
}
