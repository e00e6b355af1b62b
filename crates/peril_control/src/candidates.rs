//! Candidate generation shared by the automated strategies.
//!
//! For each move category at most one concrete action is proposed, and only
//! when it is affordable and its target currently checks out, so automated
//! players rarely burn rejections.

use std::cmp::Reverse;

use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use peril_core::{
    Action, HexCoord, PlayerView, ResourceKind, Resources, Role, Service, ServiceType, Tool,
    ToolTarget,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Move {
    Build,
    Connect,
    Upgrade,
    Debug,
    Redundancy,
    Gather,
    Tool,
    Ability,
}

impl Move {
    pub const ALL: [Move; 8] = [
        Move::Build,
        Move::Connect,
        Move::Upgrade,
        Move::Debug,
        Move::Redundancy,
        Move::Gather,
        Move::Tool,
        Move::Ability,
    ];
}

/// Which service type to build once an entry point exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStyle {
    /// The type the player owns fewest of.
    #[default]
    Balanced,
    /// Highest catalog capacity.
    Aggressive,
    /// Cheapest total cost.
    Frugal,
}

pub fn candidate_moves(view: &PlayerView<'_>, style: BuildStyle) -> Vec<(Move, Action)> {
    let Some(me) = view.me() else {
        return Vec::new();
    };
    let mine = view.my_services();
    let pool = me.resources;
    let options = [
        (Move::Build, build_move(view, &mine, pool, style)),
        (Move::Connect, connect_move(view, &mine)),
        (Move::Upgrade, upgrade_move(view, &mine)),
        (Move::Debug, debug_move(&mine)),
        (Move::Redundancy, redundancy_move(view, &mine)),
        (Move::Gather, Some(gather_move(pool))),
        (Move::Tool, tool_move(view, &mine)),
        (Move::Ability, ability_move(view, me.role, me.ability_used, &mine)),
    ];
    options
        .into_iter()
        .filter_map(|(kind, action)| {
            action
                .filter(|a| pool.covers(a.cost(view.config)))
                .map(|a| (kind, a))
        })
        .collect()
}

/// Weighted draw among candidates. `None` when nothing has positive weight.
pub fn choose(
    rng: &mut ChaCha8Rng,
    candidates: Vec<(Move, Action)>,
    weight: impl Fn(Move) -> f64,
) -> Option<(Move, Action)> {
    let (options, weights): (Vec<_>, Vec<f64>) = candidates
        .into_iter()
        .map(|(kind, action)| {
            let w = weight(kind);
            ((kind, action), w)
        })
        .filter(|(_, w)| *w > 0.0 && w.is_finite())
        .unzip();
    let index = WeightedIndex::new(&weights).ok()?.sample(rng);
    options.into_iter().nth(index)
}

// ---------------------------------------------------------------------------
// Per-category proposals
// ---------------------------------------------------------------------------

fn build_move(
    view: &PlayerView<'_>,
    mine: &[&Service],
    pool: Resources,
    style: BuildStyle,
) -> Option<Action> {
    let catalog = &view.config.catalog;
    let affordable: Vec<ServiceType> = ServiceType::ALL
        .into_iter()
        .filter(|t| pool.covers(catalog.get(*t).cost))
        .collect();
    let has_entry = mine.iter().any(|s| s.service_type.is_entry());
    let entry = affordable
        .iter()
        .copied()
        .filter(|t| t.is_entry())
        .max_by_key(|t| (catalog.get(*t).capacity, Reverse(*t)));

    let service_type = match (has_entry, entry) {
        (false, Some(entry)) => entry,
        _ => match style {
            BuildStyle::Balanced => affordable
                .iter()
                .copied()
                .min_by_key(|t| mine.iter().filter(|s| s.service_type == *t).count())?,
            BuildStyle::Aggressive => affordable
                .iter()
                .copied()
                .max_by_key(|t| (catalog.get(*t).capacity, Reverse(*t)))?,
            BuildStyle::Frugal => affordable
                .iter()
                .copied()
                .min_by_key(|t| catalog.get(*t).cost.total())?,
        },
    };
    let home = view.me()?.home;
    let location = free_cell_near(view, mine, home)?;
    Some(Action::Build {
        service_type,
        location,
    })
}

/// Free cell closest to the player's services (or home), row-major on ties.
fn free_cell_near(view: &PlayerView<'_>, mine: &[&Service], home: HexCoord) -> Option<HexCoord> {
    let grid = &view.state.grid;
    let anchors: Vec<HexCoord> = if mine.is_empty() {
        vec![home]
    } else {
        mine.iter().map(|s| s.location).collect()
    };
    let rows = i32::try_from(grid.height()).ok()?;
    let cols = i32::try_from(grid.width()).ok()?;
    (0..rows)
        .flat_map(|row| (0..cols).map(move |col| HexCoord::new(row, col)))
        .filter(|cell| grid.is_free(*cell))
        .min_by_key(|cell| anchors.iter().map(|a| a.distance(*cell)).min().unwrap_or(u32::MAX))
}

fn connect_move(view: &PlayerView<'_>, mine: &[&Service]) -> Option<Action> {
    let adjacent_only = view.config.rules.require_adjacent_connections;
    let linkable = |from: &Service, to: &Service| {
        from.id != to.id
            && (!adjacent_only || from.location.is_adjacent(to.location))
            && view.state.connection_between(from.id, to.id).is_none()
    };
    let mut fallback = None;
    for from in mine {
        for to in mine {
            if !linkable(*from, *to) {
                continue;
            }
            match (from.service_type.is_entry(), to.service_type.is_entry()) {
                (true, false) => {
                    return Some(Action::Connect {
                        from: from.id,
                        to: to.id,
                    })
                }
                // Forward-only links between backends keep cascades acyclic.
                (false, false) if fallback.is_none() && from.id < to.id => {
                    fallback = Some(Action::Connect {
                        from: from.id,
                        to: to.id,
                    });
                }
                _ => {}
            }
        }
    }
    fallback
}

fn upgrade_move(view: &PlayerView<'_>, mine: &[&Service]) -> Option<Action> {
    let limit = view.config.rules.max_upgrades;
    mine.iter()
        .filter(|s| s.upgrades < limit)
        .min_by_key(|s| (!s.service_type.is_entry(), s.effective_capacity(), s.id))
        .map(|s| Action::Upgrade { service: s.id })
}

fn debug_move(mine: &[&Service]) -> Option<Action> {
    mine.iter()
        .filter(|s| s.bugs > 0)
        .max_by_key(|s| (s.bugs, Reverse(s.id)))
        .map(|s| Action::Debug { service: s.id })
}

/// Only worth it once chaos is about to start firing.
fn redundancy_move(view: &PlayerView<'_>, mine: &[&Service]) -> Option<Action> {
    if view.state.entropy < view.config.chaos.threshold {
        return None;
    }
    mine.iter()
        .filter(|s| s.shields == 0)
        .min_by_key(|s| (!s.service_type.is_entry(), s.id))
        .map(|s| Action::DeployRedundancy { service: s.id })
}

fn gather_move(pool: Resources) -> Action {
    let resource = ResourceKind::ALL
        .into_iter()
        .min_by_key(|k| pool.get(*k))
        .unwrap_or(ResourceKind::Cpu);
    Action::Gather { resource }
}

fn tool_move(view: &PlayerView<'_>, mine: &[&Service]) -> Option<Action> {
    let slow_link = mine
        .iter()
        .flat_map(|s| s.outbound.iter())
        .filter_map(|id| view.state.connection(*id))
        .find(|c| c.latency > 0);
    if let Some(link) = slow_link {
        return Some(Action::UseTool {
            tool: Tool::CircuitBreaker,
            target: ToolTarget::Connection(link.id),
        });
    }
    if let Some(slow) = mine.iter().find(|s| s.latency > 0) {
        return Some(Action::UseTool {
            tool: Tool::Profiler,
            target: ToolTarget::Service(slow.id),
        });
    }
    mine.iter()
        .find(|s| s.capacity < s.max_capacity)
        .map(|s| Action::UseTool {
            tool: Tool::Autoscaler,
            target: ToolTarget::Service(s.id),
        })
}

fn ability_move(
    view: &PlayerView<'_>,
    role: Role,
    used: bool,
    mine: &[&Service],
) -> Option<Action> {
    if used {
        return None;
    }
    let target = match role {
        Role::Sre => {
            return (view.state.entropy > 0).then_some(Action::ActivateAbility { target: None });
        }
        Role::Architect => mine
            .iter()
            .filter(|s| s.capacity < s.max_capacity)
            .min_by_key(|s| s.capacity)?,
        Role::DevOps => mine
            .iter()
            .filter(|s| s.bugs > 0)
            .max_by_key(|s| (s.bugs, Reverse(s.id)))?,
        Role::Security => mine
            .iter()
            .min_by_key(|s| (!s.service_type.is_entry(), s.shields, s.id))?,
    };
    Some(Action::ActivateAbility {
        target: Some(target.id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use peril_core::test_fixtures::{base_config, build_at, ready_state};
    use peril_core::PlayerId;

    fn kinds(view: &PlayerView<'_>) -> Vec<Move> {
        candidate_moves(view, BuildStyle::Balanced)
            .into_iter()
            .map(|(kind, _)| kind)
            .collect()
    }

    #[test]
    fn empty_board_offers_build_and_gather() {
        let config = base_config();
        let state = ready_state(&config);
        let view = PlayerView::new(PlayerId(0), &state, &config);
        assert_eq!(kinds(&view), vec![Move::Build, Move::Gather]);

        let (_, build) = candidate_moves(&view, BuildStyle::Balanced).remove(0);
        assert_eq!(
            build,
            Action::Build {
                service_type: ServiceType::LoadBalancer,
                location: state.players[0].home,
            }
        );
    }

    #[test]
    fn entry_is_linked_to_an_adjacent_backend() {
        let config = base_config();
        let mut state = ready_state(&config);
        let lb = build_at(&mut state, PlayerId(0), ServiceType::LoadBalancer, HexCoord::new(2, 2));
        let db = build_at(&mut state, PlayerId(0), ServiceType::Database, HexCoord::new(2, 3));
        let view = PlayerView::new(PlayerId(0), &state, &config);
        let connect = candidate_moves(&view, BuildStyle::Balanced)
            .into_iter()
            .find(|(kind, _)| *kind == Move::Connect)
            .map(|(_, action)| action);
        assert_eq!(connect, Some(Action::Connect { from: lb, to: db }));
    }

    #[test]
    fn gather_targets_the_scarcest_resource() {
        assert_eq!(
            gather_move(Resources::new(4, 1, 3)),
            Action::Gather {
                resource: ResourceKind::Memory
            }
        );
    }

    #[test]
    fn zero_weights_choose_nothing() {
        use rand::SeedableRng;
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let candidates = vec![(
            Move::Gather,
            Action::Gather {
                resource: ResourceKind::Cpu,
            },
        )];
        assert!(choose(&mut rng, candidates.clone(), |_| 0.0).is_none());
        assert!(choose(&mut rng, candidates, |_| 1.0).is_some());
    }
}
