//! Entropy-driven chaos: the event table, its effects, and entropy decay.
//!
//! The roll is looked up before anything is touched, so a roll with no
//! table entry fails without mutating the state.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{GameConfig, MAX_ENTROPY};
use crate::dice::{Dice, Die, Roller};
use crate::error::ChaosTableLookupError;
use crate::{ChaosRecord, ConnectionId, GameState, PlayerId, ResourceKind, ServiceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Minor,
    Moderate,
    Major,
    Critical,
    Catastrophic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChaosKind {
    MinorGlitch,
    LatencySpike,
    MemoryLeak,
    BugInfestation,
    DiskFull,
    NetworkPartition,
    EntropySurge,
    TheStaticStrikes,
    SecurityBreach,
    CascadingOutage,
    DataCorruption,
    SystemMeltdown,
}

impl ChaosKind {
    /// Table lookup. Rows 1-8 are reachable on a d8, 9-10 need a d10 and
    /// 11-12 need a d12.
    pub fn from_roll(roll: u8, die: Die) -> Result<Self, ChaosTableLookupError> {
        let kind = match roll {
            1 => ChaosKind::MinorGlitch,
            2 => ChaosKind::LatencySpike,
            3 => ChaosKind::MemoryLeak,
            4 => ChaosKind::BugInfestation,
            5 => ChaosKind::DiskFull,
            6 => ChaosKind::NetworkPartition,
            7 => ChaosKind::EntropySurge,
            8 => ChaosKind::TheStaticStrikes,
            9 => ChaosKind::SecurityBreach,
            10 => ChaosKind::CascadingOutage,
            11 => ChaosKind::DataCorruption,
            12 => ChaosKind::SystemMeltdown,
            _ => return Err(ChaosTableLookupError { roll, die }),
        };
        Ok(kind)
    }

    pub fn severity(self) -> Severity {
        match self {
            ChaosKind::MinorGlitch | ChaosKind::LatencySpike => Severity::Minor,
            ChaosKind::MemoryLeak | ChaosKind::BugInfestation | ChaosKind::DiskFull => {
                Severity::Moderate
            }
            ChaosKind::NetworkPartition | ChaosKind::EntropySurge => Severity::Major,
            ChaosKind::TheStaticStrikes
            | ChaosKind::SecurityBreach
            | ChaosKind::CascadingOutage
            | ChaosKind::DataCorruption => Severity::Critical,
            ChaosKind::SystemMeltdown => Severity::Catastrophic,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChaosKind::MinorGlitch => "Minor Glitch",
            ChaosKind::LatencySpike => "Latency Spike",
            ChaosKind::MemoryLeak => "Memory Leak",
            ChaosKind::BugInfestation => "Bug Infestation",
            ChaosKind::DiskFull => "Disk Full",
            ChaosKind::NetworkPartition => "Network Partition",
            ChaosKind::EntropySurge => "Entropy Surge",
            ChaosKind::TheStaticStrikes => "The Static Strikes",
            ChaosKind::SecurityBreach => "Security Breach",
            ChaosKind::CascadingOutage => "Cascading Outage",
            ChaosKind::DataCorruption => "Data Corruption",
            ChaosKind::SystemMeltdown => "System Meltdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum ChaosEffect {
    CapacityLost { service: ServiceId, amount: u32 },
    BugsAdded { service: ServiceId, amount: u32 },
    LatencyAdded { connection: ConnectionId, amount: u32 },
    ResourceLost {
        player: PlayerId,
        resource: ResourceKind,
        amount: u32,
    },
    EntropyRaised { entropy: u8 },
    ServiceDestroyed { service: ServiceId, owner: PlayerId },
    /// A redundancy shield took the hit instead.
    Absorbed { service: ServiceId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaosEvent {
    pub round: u32,
    pub die: Die,
    pub roll: u8,
    pub kind: ChaosKind,
    pub severity: Severity,
    pub effects: Vec<ChaosEffect>,
}

/// Rolls for chaos and applies the event, if any.
///
/// Fires only when entropy is above the threshold and the probability
/// check passes. Entropy decay is applied separately by the phase driver.
pub fn maybe_trigger(
    state: &mut GameState,
    dice: &mut Dice,
    config: &GameConfig,
) -> Result<Option<ChaosEvent>, ChaosTableLookupError> {
    if state.entropy <= config.chaos.threshold {
        return Ok(None);
    }
    if !dice.chance(config.chaos.probability) {
        return Ok(None);
    }
    let die = config.chaos.die_for(state.entropy);
    let roll = dice.roll(die);
    let kind = ChaosKind::from_roll(roll, die)?;

    let effects = apply_effect(state, kind, dice, config);
    let absorbed = effects
        .iter()
        .any(|e| matches!(e, ChaosEffect::Absorbed { .. }));
    state.metrics.chaos_events += 1;
    state.metrics.chaos_log.push(ChaosRecord {
        round: state.round,
        roll,
        kind,
        severity: kind.severity(),
        absorbed,
    });
    debug!(round = state.round, roll, event = kind.label(), "chaos event");

    Ok(Some(ChaosEvent {
        round: state.round,
        die,
        roll,
        kind,
        severity: kind.severity(),
        effects,
    }))
}

/// End-of-phase decay. Returns the new entropy.
pub fn apply_decay(state: &mut GameState, config: &GameConfig) -> u8 {
    state.entropy = state
        .entropy
        .saturating_add(config.chaos.entropy_increment)
        .min(MAX_ENTROPY);
    state.entropy
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

fn apply_effect(
    state: &mut GameState,
    kind: ChaosKind,
    dice: &mut Dice,
    config: &GameConfig,
) -> Vec<ChaosEffect> {
    let mut effects = Vec::new();
    let shields = config.chaos.mitigation;
    match kind {
        ChaosKind::MinorGlitch => {
            if let Some(target) = random_service(state, dice) {
                hit_service(state, target, shields, &mut effects, |s| {
                    s.capacity = s.capacity.saturating_sub(1);
                });
            }
        }
        ChaosKind::LatencySpike => add_latency(state, None, 1, &mut effects),
        ChaosKind::MemoryLeak => drain_all(state, ResourceKind::Memory, 1, &mut effects),
        ChaosKind::BugInfestation => {
            if let Some(target) = random_service(state, dice) {
                hit_service(state, target, shields, &mut effects, |s| s.bugs += 2);
            }
        }
        ChaosKind::DiskFull => drain_all(state, ResourceKind::Storage, 1, &mut effects),
        ChaosKind::NetworkPartition => {
            let ids: Vec<ConnectionId> = state.connections.keys().copied().collect();
            if !ids.is_empty() {
                let target = ids[dice.pick(ids.len())];
                add_latency(state, Some(target), 3, &mut effects);
            }
        }
        ChaosKind::EntropySurge => {
            state.entropy = state.entropy.saturating_add(1).min(MAX_ENTROPY);
            effects.push(ChaosEffect::EntropyRaised {
                entropy: state.entropy,
            });
        }
        ChaosKind::TheStaticStrikes => {
            for target in all_services(state) {
                hit_service(state, target, shields, &mut effects, |s| {
                    s.capacity = s.capacity.saturating_sub(1);
                });
            }
        }
        ChaosKind::SecurityBreach => security_breach(state, dice, shields, &mut effects),
        ChaosKind::CascadingOutage => {
            let entries: Vec<ServiceId> = state
                .services
                .values()
                .filter(|s| s.service_type.is_entry())
                .map(|s| s.id)
                .collect();
            if !entries.is_empty() {
                let target = entries[dice.pick(entries.len())];
                hit_service(state, target, shields, &mut effects, |s| s.capacity = 0);
            }
        }
        ChaosKind::DataCorruption => {
            let stores: Vec<ServiceId> = state
                .services
                .values()
                .filter(|s| s.service_type == crate::ServiceType::Database)
                .map(|s| s.id)
                .collect();
            for target in stores {
                hit_service(state, target, shields, &mut effects, |s| {
                    s.capacity /= 2;
                    s.bugs += 1;
                });
            }
        }
        ChaosKind::SystemMeltdown => {
            for target in all_services(state) {
                hit_service(state, target, shields, &mut effects, |s| {
                    s.capacity /= 2;
                    s.bugs += 1;
                });
            }
        }
    }
    effects
}

fn all_services(state: &GameState) -> Vec<ServiceId> {
    state.services.keys().copied().collect()
}

fn random_service(state: &GameState, dice: &mut Dice) -> Option<ServiceId> {
    let ids = all_services(state);
    if ids.is_empty() {
        return None;
    }
    Some(ids[dice.pick(ids.len())])
}

/// Applies `damage` to one service unless a shield absorbs it. Records the
/// resulting capacity and bug changes.
fn hit_service(
    state: &mut GameState,
    id: ServiceId,
    shields: bool,
    effects: &mut Vec<ChaosEffect>,
    damage: impl FnOnce(&mut crate::Service),
) {
    let Some(service) = state.services.get_mut(&id) else {
        return;
    };
    if shields && service.shields > 0 {
        service.shields -= 1;
        effects.push(ChaosEffect::Absorbed { service: id });
        return;
    }
    let (capacity, bugs) = (service.capacity, service.bugs);
    damage(service);
    if service.capacity < capacity {
        effects.push(ChaosEffect::CapacityLost {
            service: id,
            amount: capacity - service.capacity,
        });
    }
    if service.bugs > bugs {
        effects.push(ChaosEffect::BugsAdded {
            service: id,
            amount: service.bugs - bugs,
        });
    }
}

fn add_latency(
    state: &mut GameState,
    only: Option<ConnectionId>,
    amount: u32,
    effects: &mut Vec<ChaosEffect>,
) {
    for connection in state.connections.values_mut() {
        if only.is_some_and(|id| id != connection.id) {
            continue;
        }
        connection.latency += amount;
        effects.push(ChaosEffect::LatencyAdded {
            connection: connection.id,
            amount,
        });
    }
}

fn drain_all(
    state: &mut GameState,
    resource: ResourceKind,
    amount: u32,
    effects: &mut Vec<ChaosEffect>,
) {
    for player in state.players.iter_mut().filter(|p| p.is_active()) {
        let lost = player.resources.drain(resource, amount);
        if lost > 0 {
            effects.push(ChaosEffect::ResourceLost {
                player: player.id,
                resource,
                amount: lost,
            });
        }
    }
}

fn security_breach(
    state: &mut GameState,
    dice: &mut Dice,
    shields: bool,
    effects: &mut Vec<ChaosEffect>,
) {
    let Some(target) = random_service(state, dice) else {
        return;
    };
    if let Some(service) = state.services.get_mut(&target) {
        if shields && service.shields > 0 {
            service.shields -= 1;
            effects.push(ChaosEffect::Absorbed { service: target });
            return;
        }
    }
    if let Some(removed) = state.remove_service(target) {
        state.metrics.services_lost += 1;
        effects.push(ChaosEffect::ServiceDestroyed {
            service: target,
            owner: removed.owner,
        });
    }
}
