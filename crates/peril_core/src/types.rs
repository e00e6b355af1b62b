//! Type definitions for `peril_core`.
//!
//! Entity model (services, connections, players), ID newtypes, and the
//! shared `GameState` that every phase mutates in place.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use crate::chaos::{ChaosKind, Severity};
use crate::grid::{Grid, HexCoord};

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! numeric_id {
    ($name:ident, $inner:ty, $prefix:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{:04}"), self.0)
            }
        }
    };
}

numeric_id!(ServiceId, u32, "svc");
numeric_id!(ConnectionId, u32, "conn");
numeric_id!(PlayerId, u32, "player");
numeric_id!(EventId, u64, "evt");

impl PlayerId {
    /// Position in the fixed turn order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Core enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Setup,
    Traffic,
    Action,
    Resolution,
    Chaos,
    End,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Traffic => "traffic",
            Phase::Action => "action",
            Phase::Resolution => "resolution",
            Phase::Chaos => "chaos",
            Phase::End => "end",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Compute,
    Database,
    Cache,
    Queue,
    LoadBalancer,
    ApiGateway,
}

impl ServiceType {
    pub const ALL: [ServiceType; 6] = [
        ServiceType::Compute,
        ServiceType::Database,
        ServiceType::Cache,
        ServiceType::Queue,
        ServiceType::LoadBalancer,
        ServiceType::ApiGateway,
    ];

    /// Entry services are the only place external traffic can land.
    pub fn is_entry(self) -> bool {
        matches!(self, ServiceType::LoadBalancer | ServiceType::ApiGateway)
    }

    pub fn label(self) -> &'static str {
        match self {
            ServiceType::Compute => "compute",
            ServiceType::Database => "database",
            ServiceType::Cache => "cache",
            ServiceType::Queue => "queue",
            ServiceType::LoadBalancer => "load_balancer",
            ServiceType::ApiGateway => "api_gateway",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cpu,
    Memory,
    Storage,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Cpu, ResourceKind::Memory, ResourceKind::Storage];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Architect,
    Sre,
    DevOps,
    Security,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Architect, Role::Sre, Role::DevOps, Role::Security];

    /// Whether the role's ability acts on one of the player's services.
    pub fn ability_needs_service(self) -> bool {
        !matches!(self, Role::Sre)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Autoscaler,
    CircuitBreaker,
    Profiler,
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resources {
    pub cpu: u32,
    pub memory: u32,
    pub storage: u32,
}

impl Resources {
    pub const fn new(cpu: u32, memory: u32, storage: u32) -> Self {
        Self {
            cpu,
            memory,
            storage,
        }
    }

    pub fn get(self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Cpu => self.cpu,
            ResourceKind::Memory => self.memory,
            ResourceKind::Storage => self.storage,
        }
    }

    pub fn add(&mut self, kind: ResourceKind, amount: u32) {
        let slot = match kind {
            ResourceKind::Cpu => &mut self.cpu,
            ResourceKind::Memory => &mut self.memory,
            ResourceKind::Storage => &mut self.storage,
        };
        *slot = slot.saturating_add(amount);
    }

    /// Removes up to `amount`, returning how much was actually lost.
    pub fn drain(&mut self, kind: ResourceKind, amount: u32) -> u32 {
        let slot = match kind {
            ResourceKind::Cpu => &mut self.cpu,
            ResourceKind::Memory => &mut self.memory,
            ResourceKind::Storage => &mut self.storage,
        };
        let lost = amount.min(*slot);
        *slot -= lost;
        lost
    }

    pub fn covers(self, cost: Resources) -> bool {
        self.cpu >= cost.cpu && self.memory >= cost.memory && self.storage >= cost.storage
    }

    pub fn checked_sub(self, cost: Resources) -> Option<Resources> {
        Some(Resources {
            cpu: self.cpu.checked_sub(cost.cpu)?,
            memory: self.memory.checked_sub(cost.memory)?,
            storage: self.storage.checked_sub(cost.storage)?,
        })
    }

    pub fn total(self) -> u32 {
        self.cpu + self.memory + self.storage
    }

    pub fn is_zero(self) -> bool {
        self.total() == 0
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub service_type: ServiceType,
    pub owner: PlayerId,
    pub location: HexCoord,
    pub capacity: u32,
    pub max_capacity: u32,
    pub upgrades: u32,
    pub bugs: u32,
    /// Requests lost to slowness before the service does any work.
    pub latency: u32,
    /// Redundant replicas; each absorbs one chaos hit while mitigation is on.
    pub shields: u32,
    /// Outbound connections in creation order.
    pub outbound: SmallVec<[ConnectionId; 4]>,
    pub built_round: u32,
}

impl Service {
    /// Requests this service can absorb in a round.
    pub fn effective_capacity(&self) -> u32 {
        self.capacity
            .saturating_sub(self.bugs)
            .saturating_sub(self.latency)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub from: ServiceId,
    pub to: ServiceId,
    pub latency: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    pub resources: Resources,
    /// Owned services in creation order.
    pub services: Vec<ServiceId>,
    pub uptime: f64,
    pub uptime_history: Vec<f64>,
    pub actions_remaining: u32,
    pub ability_used: bool,
    pub eliminated: bool,
    pub home: HexCoord,
    pub requests_handled: u64,
    pub requests_dropped: u64,
}

impl Player {
    pub fn is_active(&self) -> bool {
        !self.eliminated
    }
}

// ---------------------------------------------------------------------------
// State types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaState {
    pub game_id: Uuid,
    pub seed: u64,
    pub schema_version: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub next_event_id: u64,
    pub next_service_id: u32,
    pub next_connection_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaosRecord {
    pub round: u32,
    pub roll: u8,
    pub kind: ChaosKind,
    pub severity: Severity,
    pub absorbed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub requests_handled: u64,
    pub requests_dropped: u64,
    pub overloads: u64,
    pub cascade_failures: u64,
    pub chaos_events: u64,
    pub chaos_log: Vec<ChaosRecord>,
    pub services_built: u32,
    pub services_lost: u32,
    pub connections_created: u32,
    pub actions_applied: u64,
    pub actions_rejected: u64,
    pub strategy_timeouts: u32,
    /// Rejections caused by an empty resource pool.
    pub resource_starvation: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VictoryTracker {
    pub cooperative_streak: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TerminalResult {
    CooperativeWin {
        round: u32,
        players: Vec<PlayerId>,
    },
    CompetitiveWin {
        round: u32,
        winners: Vec<PlayerId>,
        score: f64,
    },
    SurvivalWin {
        round: u32,
        winner: PlayerId,
    },
    Timeout {
        round: u32,
    },
    /// Every remaining player's uptime fell to the collapse line.
    Collapse {
        round: u32,
    },
}

impl TerminalResult {
    pub fn round(&self) -> u32 {
        match self {
            TerminalResult::CooperativeWin { round, .. }
            | TerminalResult::CompetitiveWin { round, .. }
            | TerminalResult::SurvivalWin { round, .. }
            | TerminalResult::Timeout { round }
            | TerminalResult::Collapse { round } => *round,
        }
    }

    pub fn is_draw(&self) -> bool {
        matches!(self, TerminalResult::Timeout { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            TerminalResult::CooperativeWin { .. } => "cooperative_win",
            TerminalResult::CompetitiveWin { .. } => "competitive_win",
            TerminalResult::SurvivalWin { .. } => "survival_win",
            TerminalResult::Timeout { .. } => "timeout",
            TerminalResult::Collapse { .. } => "collapse",
        }
    }

    pub fn winners(&self) -> Vec<PlayerId> {
        match self {
            TerminalResult::CooperativeWin { players, .. } => players.clone(),
            TerminalResult::CompetitiveWin { winners, .. } => winners.clone(),
            TerminalResult::SurvivalWin { winner, .. } => vec![*winner],
            TerminalResult::Timeout { .. } | TerminalResult::Collapse { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub meta: MetaState,
    pub round: u32,
    pub phase: Phase,
    pub entropy: u8,
    /// Fixed turn order; a player's id is its index.
    pub players: Vec<Player>,
    pub grid: Grid,
    pub services: BTreeMap<ServiceId, Service>,
    pub connections: BTreeMap<ConnectionId, Connection>,
    /// Incoming requests per player, rolled in Traffic and consumed in Resolution.
    pub pending_traffic: Option<Vec<u32>>,
    pub metrics: Metrics,
    pub victory: VictoryTracker,
    pub result: Option<TerminalResult>,
    pub counters: Counters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resources_checked_sub_refuses_overdraw() {
        let pool = Resources::new(2, 1, 0);
        assert_eq!(
            pool.checked_sub(Resources::new(1, 1, 0)),
            Some(Resources::new(1, 0, 0))
        );
        assert_eq!(pool.checked_sub(Resources::new(0, 0, 1)), None);
        assert!(!pool.covers(Resources::new(3, 0, 0)));
    }

    #[test]
    fn drain_reports_actual_loss() {
        let mut pool = Resources::new(1, 4, 0);
        assert_eq!(pool.drain(ResourceKind::Cpu, 3), 1);
        assert_eq!(pool.drain(ResourceKind::Memory, 3), 3);
        assert_eq!(pool, Resources::new(0, 1, 0));
    }

    #[test]
    fn effective_capacity_saturates() {
        let service = Service {
            id: ServiceId(0),
            service_type: ServiceType::Cache,
            owner: PlayerId(0),
            location: HexCoord::new(0, 0),
            capacity: 3,
            max_capacity: 8,
            upgrades: 0,
            bugs: 2,
            latency: 4,
            shields: 0,
            outbound: SmallVec::new(),
            built_round: 1,
        };
        assert_eq!(service.effective_capacity(), 0);
    }

    #[test]
    fn ids_display_with_prefix() {
        assert_eq!(ServiceId(7).to_string(), "svc_0007");
        assert_eq!(PlayerId(2).to_string(), "player_0002");
    }

    #[test]
    fn only_balancers_and_gateways_are_entries() {
        let entries: Vec<ServiceType> = ServiceType::ALL
            .into_iter()
            .filter(|t| t.is_entry())
            .collect();
        assert_eq!(entries, vec![ServiceType::LoadBalancer, ServiceType::ApiGateway]);
    }
}
