//! Action resolver: validates one player action and applies it.
//!
//! Validation order is budget, then cost, then target. Nothing is mutated
//! until all three pass.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GameConfig;
use crate::dice::{Dice, Die, PresetRolls, Roller};
use crate::error::{TargetIssue, ValidationError, ValidationErrorKind};
use crate::grid::HexCoord;
use crate::{
    ConnectionId, GameState, PlayerId, ResourceKind, Resources, Role, Service, ServiceId,
    ServiceType, Tool,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action_type", content = "parameters", rename_all = "snake_case")]
pub enum Action {
    Build {
        service_type: ServiceType,
        location: HexCoord,
    },
    Connect {
        from: ServiceId,
        to: ServiceId,
    },
    Upgrade {
        service: ServiceId,
    },
    Debug {
        service: ServiceId,
    },
    DeployRedundancy {
        service: ServiceId,
    },
    Gather {
        resource: ResourceKind,
    },
    UseTool {
        tool: Tool,
        target: ToolTarget,
    },
    ActivateAbility {
        #[serde(default)]
        target: Option<ServiceId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolTarget {
    Service(ServiceId),
    Connection(ConnectionId),
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::Build { .. } => "build",
            Action::Connect { .. } => "connect",
            Action::Upgrade { .. } => "upgrade",
            Action::Debug { .. } => "debug",
            Action::DeployRedundancy { .. } => "deploy_redundancy",
            Action::Gather { .. } => "gather",
            Action::UseTool { .. } => "use_tool",
            Action::ActivateAbility { .. } => "activate_ability",
        }
    }

    /// Resource cost, independent of the current state.
    pub fn cost(&self, config: &GameConfig) -> Resources {
        let rules = &config.rules;
        match self {
            Action::Build { service_type, .. } => config.catalog.get(*service_type).cost,
            Action::Connect { .. } => rules.connection_cost,
            Action::Upgrade { .. } => rules.upgrade_cost,
            Action::DeployRedundancy { .. } => rules.redundancy_cost,
            Action::UseTool { tool, .. } => match tool {
                Tool::Autoscaler => rules.autoscaler_cost,
                Tool::CircuitBreaker => rules.circuit_breaker_cost,
                Tool::Profiler => rules.profiler_cost,
            },
            Action::Debug { .. } | Action::Gather { .. } | Action::ActivateAbility { .. } => {
                Resources::default()
            }
        }
    }
}

/// One observable change made by an applied action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Delta {
    ResourcesSpent {
        player: PlayerId,
        cost: Resources,
    },
    ResourcesGained {
        player: PlayerId,
        resource: ResourceKind,
        amount: u32,
    },
    ServiceBuilt {
        service: ServiceId,
        service_type: ServiceType,
        location: HexCoord,
        capacity: u32,
    },
    ConnectionCreated {
        connection: ConnectionId,
        from: ServiceId,
        to: ServiceId,
    },
    CapacityChanged {
        service: ServiceId,
        capacity: u32,
        max_capacity: u32,
    },
    BugsChanged {
        service: ServiceId,
        bugs: u32,
    },
    ShieldsChanged {
        service: ServiceId,
        shields: u32,
    },
    ServiceLatencyCleared {
        service: ServiceId,
    },
    ConnectionLatencyCleared {
        connection: ConnectionId,
    },
    EntropyChanged {
        entropy: u8,
    },
    AbilityUsed {
        player: PlayerId,
        role: Role,
        success: bool,
    },
}

/// A d20 check made while resolving an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub dc: u8,
    pub roll: u8,
    pub success: bool,
    pub escalated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub dice: Vec<u8>,
    pub check: Option<CheckResult>,
    pub delta: Vec<Delta>,
}

/// Action submission record for external or relayed players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub player_id: PlayerId,
    #[serde(flatten)]
    pub action: Action,
    /// Physical or audited d20 results, consumed before the game's own dice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice_rolls: Option<Vec<u8>>,
}

/// Structured answer to an `ActionRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ValidationErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub delta: Vec<Delta>,
    pub dice: Vec<u8>,
}

impl ActionResult {
    pub fn from_result(result: &Result<ActionOutcome, ValidationError>) -> Self {
        match result {
            Ok(outcome) => ActionResult {
                success: true,
                error_kind: None,
                error: None,
                delta: outcome.delta.clone(),
                dice: outcome.dice.clone(),
            },
            Err(err) => ActionResult {
                success: false,
                error_kind: Some(err.kind()),
                error: Some(err.to_string()),
                delta: Vec::new(),
                dice: Vec::new(),
            },
        }
    }
}

/// Bug severity tiers for the Debug check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BugSeverity {
    Low,
    Medium,
    High,
}

impl BugSeverity {
    pub fn from_bugs(bugs: u32) -> Option<Self> {
        match bugs {
            0 => None,
            1 => Some(BugSeverity::Low),
            2 => Some(BugSeverity::Medium),
            _ => Some(BugSeverity::High),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Applies a submitted request, honouring any preset dice rolls.
pub fn submit(
    state: &mut GameState,
    request: &ActionRequest,
    dice: &mut Dice,
    config: &GameConfig,
) -> Result<ActionOutcome, ValidationError> {
    match request.dice_rolls.as_deref() {
        Some(preset) => {
            if let Some(bad) = preset
                .iter()
                .copied()
                .find(|r| !(1..=Die::D20.sides()).contains(r))
            {
                return Err(ValidationError::from(TargetIssue::InvalidDiceRoll(bad)));
            }
            let mut roller = PresetRolls::new(preset, dice);
            apply(state, request.player_id, &request.action, &mut roller, config)
        }
        None => apply(state, request.player_id, &request.action, dice, config),
    }
}

pub fn apply(
    state: &mut GameState,
    player: PlayerId,
    action: &Action,
    roller: &mut impl Roller,
    config: &GameConfig,
) -> Result<ActionOutcome, ValidationError> {
    let actor = state
        .player(player)
        .ok_or(TargetIssue::UnknownPlayer(player))?;
    if actor.eliminated {
        return Err(ValidationError::from(TargetIssue::PlayerEliminated(player)));
    }
    if actor.actions_remaining == 0 {
        return Err(ValidationError::ActionBudgetExhausted { player });
    }
    let cost = action.cost(config);
    let Some(remaining) = actor.resources.checked_sub(cost) else {
        return Err(ValidationError::InsufficientResources {
            player,
            needed: cost,
            available: actor.resources,
        });
    };
    check_target(state, player, action, config)?;

    if let Some(actor) = state.player_mut(player) {
        actor.resources = remaining;
        actor.actions_remaining -= 1;
    }
    let mut outcome = ActionOutcome::default();
    if !cost.is_zero() {
        outcome.delta.push(Delta::ResourcesSpent { player, cost });
    }
    execute(state, player, action, roller, config, &mut outcome);
    state.metrics.actions_applied += 1;
    debug!(%player, action = action.label(), "action applied");
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Target validation
// ---------------------------------------------------------------------------

fn owned(state: &GameState, player: PlayerId, id: ServiceId) -> Result<&Service, TargetIssue> {
    let service = state.service(id).ok_or(TargetIssue::UnknownService(id))?;
    if service.owner != player {
        return Err(TargetIssue::NotOwner { service: id });
    }
    Ok(service)
}

fn check_target(
    state: &GameState,
    player: PlayerId,
    action: &Action,
    config: &GameConfig,
) -> Result<(), TargetIssue> {
    match action {
        Action::Build { location, .. } => {
            if !state.grid.in_bounds(*location) {
                return Err(TargetIssue::OutOfBounds(*location));
            }
            if state.grid.occupant(*location).is_some() {
                return Err(TargetIssue::CellOccupied(*location));
            }
        }
        Action::Connect { from, to } => check_connect(state, player, *from, *to, config)?,
        Action::Upgrade { service } => {
            if owned(state, player, *service)?.upgrades >= config.rules.max_upgrades {
                return Err(TargetIssue::UpgradeLimit(*service));
            }
        }
        Action::Debug { service } => {
            if owned(state, player, *service)?.bugs == 0 {
                return Err(TargetIssue::NoBugs(*service));
            }
        }
        Action::DeployRedundancy { service } => {
            owned(state, player, *service)?;
        }
        Action::Gather { .. } => {}
        Action::UseTool { tool, target } => check_tool(state, player, *tool, *target)?,
        Action::ActivateAbility { target } => check_ability(state, player, *target)?,
    }
    Ok(())
}

fn check_connect(
    state: &GameState,
    player: PlayerId,
    from: ServiceId,
    to: ServiceId,
    config: &GameConfig,
) -> Result<(), TargetIssue> {
    let upstream = owned(state, player, from)?;
    let downstream = owned(state, player, to)?;
    if from == to {
        return Err(TargetIssue::SelfConnection(from));
    }
    if config.rules.require_adjacent_connections
        && !upstream.location.is_adjacent(downstream.location)
    {
        return Err(TargetIssue::NotAdjacent { from, to });
    }
    if state.connection_between(from, to).is_some() {
        return Err(TargetIssue::DuplicateConnection { from, to });
    }
    Ok(())
}

fn check_tool(
    state: &GameState,
    player: PlayerId,
    tool: Tool,
    target: ToolTarget,
) -> Result<(), TargetIssue> {
    match (tool, target) {
        (Tool::Autoscaler, ToolTarget::Service(id)) => {
            let service = owned(state, player, id)?;
            if service.capacity >= service.max_capacity {
                return Err(TargetIssue::FullCapacity(id));
            }
        }
        (Tool::Profiler, ToolTarget::Service(id)) => {
            if owned(state, player, id)?.latency == 0 {
                return Err(TargetIssue::NoServiceLatency(id));
            }
        }
        (Tool::CircuitBreaker, ToolTarget::Connection(id)) => {
            let connection = state
                .connection(id)
                .ok_or(TargetIssue::UnknownConnection(id))?;
            owned(state, player, connection.from)?;
            if connection.latency == 0 {
                return Err(TargetIssue::NoConnectionLatency(id));
            }
        }
        (tool, _) => return Err(TargetIssue::WrongToolTarget(tool)),
    }
    Ok(())
}

fn check_ability(
    state: &GameState,
    player: PlayerId,
    target: Option<ServiceId>,
) -> Result<(), TargetIssue> {
    let actor = state
        .player(player)
        .ok_or(TargetIssue::UnknownPlayer(player))?;
    if actor.ability_used {
        return Err(TargetIssue::AbilityUsed);
    }
    if actor.role == Role::Sre {
        if state.entropy == 0 {
            return Err(TargetIssue::EntropyFloor);
        }
        return Ok(());
    }
    let id = target.ok_or(TargetIssue::MissingAbilityTarget)?;
    let service = owned(state, player, id)?;
    match actor.role {
        Role::Architect if service.capacity >= service.max_capacity => {
            Err(TargetIssue::FullCapacity(id))
        }
        Role::DevOps if service.bugs == 0 => Err(TargetIssue::NoBugs(id)),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

fn execute(
    state: &mut GameState,
    player: PlayerId,
    action: &Action,
    roller: &mut impl Roller,
    config: &GameConfig,
    outcome: &mut ActionOutcome,
) {
    let rules = &config.rules;
    match action {
        Action::Build {
            service_type,
            location,
        } => {
            let capacity = config.catalog.get(*service_type).capacity;
            if let Some(service) = state.insert_service(player, *service_type, *location, capacity)
            {
                state.metrics.services_built += 1;
                outcome.delta.push(Delta::ServiceBuilt {
                    service,
                    service_type: *service_type,
                    location: *location,
                    capacity,
                });
            }
        }
        Action::Connect { from, to } => {
            if let Some(connection) = state.insert_connection(*from, *to) {
                state.metrics.connections_created += 1;
                outcome.delta.push(Delta::ConnectionCreated {
                    connection,
                    from: *from,
                    to: *to,
                });
            }
        }
        Action::Upgrade { service } => {
            with_service(state, *service, outcome, |s| {
                s.upgrades += 1;
                s.max_capacity += rules.upgrade_capacity_bonus;
                s.capacity += rules.upgrade_capacity_bonus;
            });
        }
        Action::Debug { service } => debug_service(state, *service, roller, config, outcome),
        Action::DeployRedundancy { service } => {
            with_service(state, *service, outcome, |s| s.shields += 1);
        }
        Action::Gather { resource } => {
            if let Some(actor) = state.player_mut(player) {
                actor.resources.add(*resource, rules.gather_amount);
            }
            outcome.delta.push(Delta::ResourcesGained {
                player,
                resource: *resource,
                amount: rules.gather_amount,
            });
        }
        Action::UseTool { tool, target } => use_tool(state, *tool, *target, config, outcome),
        Action::ActivateAbility { target } => {
            activate_ability(state, player, *target, roller, config, outcome);
        }
    }
}

/// Mutates one service and records whatever changed.
fn with_service(
    state: &mut GameState,
    id: ServiceId,
    outcome: &mut ActionOutcome,
    change: impl FnOnce(&mut Service),
) {
    let Some(service) = state.services.get_mut(&id) else {
        return;
    };
    let before = service.clone();
    change(service);
    if service.capacity != before.capacity || service.max_capacity != before.max_capacity {
        outcome.delta.push(Delta::CapacityChanged {
            service: id,
            capacity: service.capacity,
            max_capacity: service.max_capacity,
        });
    }
    if service.bugs != before.bugs {
        outcome.delta.push(Delta::BugsChanged {
            service: id,
            bugs: service.bugs,
        });
    }
    if service.shields != before.shields {
        outcome.delta.push(Delta::ShieldsChanged {
            service: id,
            shields: service.shields,
        });
    }
    if service.latency == 0 && before.latency > 0 {
        outcome
            .delta
            .push(Delta::ServiceLatencyCleared { service: id });
    }
}

/// Difficulty class and escalation ceiling for a bug count.
pub fn debug_difficulty(bugs: u32, config: &GameConfig) -> Option<(u8, u8)> {
    let table = &config.rules.debug;
    BugSeverity::from_bugs(bugs).map(|severity| match severity {
        BugSeverity::Low => (table.low_dc, 0),
        BugSeverity::Medium => (table.medium_dc, table.medium_escalation),
        BugSeverity::High => (table.high_dc, table.high_escalation),
    })
}

fn debug_service(
    state: &mut GameState,
    id: ServiceId,
    roller: &mut impl Roller,
    config: &GameConfig,
    outcome: &mut ActionOutcome,
) {
    let bugs = state.service(id).map_or(0, |s| s.bugs);
    let Some((dc, escalation)) = debug_difficulty(bugs, config) else {
        return;
    };
    let roll = roller.roll(Die::D20);
    let success = roll >= dc;
    let escalated = !success && roll <= escalation;
    outcome.dice.push(roll);
    outcome.check = Some(CheckResult {
        dc,
        roll,
        success,
        escalated,
    });
    with_service(state, id, outcome, |s| {
        if success {
            s.bugs -= 1;
        } else if escalated {
            s.bugs += 1;
        }
    });
}

fn use_tool(
    state: &mut GameState,
    tool: Tool,
    target: ToolTarget,
    config: &GameConfig,
    outcome: &mut ActionOutcome,
) {
    match (tool, target) {
        (Tool::Autoscaler, ToolTarget::Service(id)) => {
            let restore = config.rules.autoscaler_restore;
            with_service(state, id, outcome, |s| {
                s.capacity = (s.capacity + restore).min(s.max_capacity);
            });
        }
        (Tool::Profiler, ToolTarget::Service(id)) => {
            with_service(state, id, outcome, |s| s.latency = 0);
        }
        (Tool::CircuitBreaker, ToolTarget::Connection(id)) => {
            if let Some(connection) = state.connections.get_mut(&id) {
                connection.latency = 0;
                outcome
                    .delta
                    .push(Delta::ConnectionLatencyCleared { connection: id });
            }
        }
        _ => {}
    }
}

fn activate_ability(
    state: &mut GameState,
    player: PlayerId,
    target: Option<ServiceId>,
    roller: &mut impl Roller,
    config: &GameConfig,
    outcome: &mut ActionOutcome,
) {
    let Some(actor) = state.player_mut(player) else {
        return;
    };
    actor.ability_used = true;
    let role = actor.role;

    let dc = config.rules.ability_dc;
    let roll = roller.roll(Die::D20);
    let success = roll >= dc;
    outcome.dice.push(roll);
    outcome.check = Some(CheckResult {
        dc,
        roll,
        success,
        escalated: false,
    });
    outcome.delta.push(Delta::AbilityUsed {
        player,
        role,
        success,
    });

    match (role, target) {
        (Role::Sre, _) => {
            if success {
                state.entropy = state.entropy.saturating_sub(1);
                outcome.delta.push(Delta::EntropyChanged {
                    entropy: state.entropy,
                });
            }
        }
        (Role::Architect, Some(id)) => with_service(state, id, outcome, |s| {
            let gain = if success { s.max_capacity } else { s.capacity + 1 };
            s.capacity = gain.min(s.max_capacity);
        }),
        (Role::DevOps, Some(id)) if success => with_service(state, id, outcome, |s| s.bugs = 0),
        (Role::Security, Some(id)) if success => {
            with_service(state, id, outcome, |s| s.shields += 1);
        }
        _ => {}
    }
}
