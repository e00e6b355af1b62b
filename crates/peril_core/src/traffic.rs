//! Traffic generation, routing, overload and cascade resolution.
//!
//! Each player's requests land on their entry services (load balancers and
//! API gateways), are shared with directly connected services, and any
//! excess spills downstream along outbound connections in creation order.
//! Every request either ends up handled by some service or is dropped, so
//! `handled + dropped == volume` always holds per player.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GameConfig;
use crate::dice::{Dice, Roller};
use crate::{GameState, PlayerId, ServiceId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficRoll {
    pub player: PlayerId,
    pub dice: Vec<u8>,
    pub volume: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overload {
    pub player: PlayerId,
    pub service: ServiceId,
    pub load: u32,
    pub capacity: u32,
}

/// Excess spilled from one overloaded service and everywhere it reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeChain {
    pub player: PlayerId,
    pub origin: ServiceId,
    pub path: Vec<ServiceId>,
    /// Requests lost at dead ends, to latency, or at already-visited services.
    pub absorbed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerTraffic {
    pub player: PlayerId,
    pub volume: u32,
    pub handled: u32,
    pub dropped: u32,
    pub overloaded: Vec<ServiceId>,
    pub instantaneous_uptime: f64,
    pub uptime: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub round: u32,
    pub players: Vec<PlayerTraffic>,
    pub overloads: Vec<Overload>,
    pub cascades: Vec<CascadeChain>,
    pub requests_handled: u64,
    pub requests_dropped: u64,
}

/// Rolls incoming volume for every active player and parks it on the state
/// for the Resolution phase.
pub fn roll_traffic(state: &mut GameState, dice: &mut Dice, config: &GameConfig) -> Vec<TrafficRoll> {
    let rules = &config.rules;
    let mut rolls = Vec::with_capacity(state.players.len());
    let mut volumes = Vec::with_capacity(state.players.len());
    for player in &state.players {
        if !player.is_active() {
            volumes.push(0);
            continue;
        }
        let faces: Vec<u8> = (0..rules.traffic_dice)
            .map(|_| dice.roll(rules.traffic_die))
            .collect();
        let volume = faces.iter().map(|f| u32::from(*f)).sum();
        volumes.push(volume);
        rolls.push(TrafficRoll {
            player: player.id,
            dice: faces,
            volume,
        });
    }
    state.pending_traffic = Some(volumes);
    rolls
}

/// Routes this round's traffic, applies overload bugs and updates uptime.
/// Rolls traffic first when none is pending.
pub fn resolve_round(state: &mut GameState, dice: &mut Dice, config: &GameConfig) -> ResolutionReport {
    if state.pending_traffic.is_none() {
        roll_traffic(state, dice, config);
    }
    let volumes = state.pending_traffic.take().unwrap_or_default();

    let mut report = ResolutionReport {
        round: state.round,
        ..ResolutionReport::default()
    };
    let active: Vec<PlayerId> = state.active_players().map(|p| p.id).collect();
    for player in active {
        let volume = volumes.get(player.index()).copied().unwrap_or(0);
        let flow = Router::new(state, player).run(volume);
        settle_player(state, player, volume, flow, config, &mut report);
    }

    state.metrics.requests_handled += report.requests_handled;
    state.metrics.requests_dropped += report.requests_dropped;
    state.metrics.overloads += report.overloads.len() as u64;
    state.metrics.cascade_failures += report.cascades.len() as u64;
    debug!(
        round = state.round,
        handled = report.requests_handled,
        dropped = report.requests_dropped,
        overloads = report.overloads.len(),
        "round resolved"
    );
    report
}

fn settle_player(
    state: &mut GameState,
    player: PlayerId,
    volume: u32,
    flow: Flow,
    config: &GameConfig,
    report: &mut ResolutionReport,
) {
    let handled = flow.handled.min(volume);
    let dropped = volume - handled;

    for overload in &flow.overloads {
        if let Some(service) = state.services.get_mut(&overload.service) {
            service.bugs += config.rules.bugs_per_overload;
        }
    }

    let instantaneous = if flow.service_count == 0 {
        0.0
    } else {
        let healthy = flow.service_count - flow.overloads.len();
        100.0 * healthy as f64 / flow.service_count as f64
    };
    let alpha = config.rules.uptime_smoothing;
    let Some(owner) = state.player_mut(player) else {
        return;
    };
    owner.uptime += alpha * (instantaneous - owner.uptime);
    owner.uptime_history.push(owner.uptime);
    owner.requests_handled += u64::from(handled);
    owner.requests_dropped += u64::from(dropped);

    report.requests_handled += u64::from(handled);
    report.requests_dropped += u64::from(dropped);
    report.players.push(PlayerTraffic {
        player,
        volume,
        handled,
        dropped,
        overloaded: flow.overloads.iter().map(|o| o.service).collect(),
        instantaneous_uptime: instantaneous,
        uptime: owner.uptime,
    });
    report.overloads.extend(flow.overloads);
    report.cascades.extend(flow.cascades);
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

struct Flow {
    handled: u32,
    service_count: usize,
    overloads: Vec<Overload>,
    cascades: Vec<CascadeChain>,
}

struct Router<'a> {
    state: &'a GameState,
    player: PlayerId,
    load: AHashMap<ServiceId, u32>,
    spilled: AHashMap<ServiceId, u32>,
    cascades: Vec<CascadeChain>,
}

impl<'a> Router<'a> {
    fn new(state: &'a GameState, player: PlayerId) -> Self {
        Self {
            state,
            player,
            load: AHashMap::new(),
            spilled: AHashMap::new(),
            cascades: Vec::new(),
        }
    }

    fn capacity(&self, id: ServiceId) -> u32 {
        self.state
            .service(id)
            .map_or(0, crate::Service::effective_capacity)
    }

    fn load_of(&self, id: ServiceId) -> u32 {
        self.load.get(&id).copied().unwrap_or(0)
    }

    fn remaining(&self, id: ServiceId) -> u32 {
        self.capacity(id).saturating_sub(self.load_of(id))
    }

    /// Load above capacity that has not been passed on yet.
    fn unspilled(&self, id: ServiceId) -> u32 {
        let over = self.load_of(id).saturating_sub(self.capacity(id));
        over - self.spilled.get(&id).copied().unwrap_or(0)
    }

    /// Outbound links as (target, latency) in creation order.
    fn links(&self, id: ServiceId) -> Vec<(ServiceId, u32)> {
        self.state.service(id).map_or_else(Vec::new, |service| {
            service
                .outbound
                .iter()
                .filter_map(|c| self.state.connection(*c))
                .map(|c| (c.to, c.latency))
                .collect()
        })
    }

    fn run(mut self, volume: u32) -> Flow {
        let services: Vec<ServiceId> = self
            .state
            .services_of(self.player)
            .iter()
            .map(|s| s.id)
            .collect();
        let entries: Vec<ServiceId> = self
            .state
            .services_of(self.player)
            .iter()
            .filter(|s| s.service_type.is_entry())
            .map(|s| s.id)
            .collect();

        if !entries.is_empty() {
            self.distribute(volume, &entries);
            for id in &services {
                let excess = self.unspilled(*id);
                if excess > 0 {
                    self.cascade(*id, excess);
                }
            }
        }

        let mut handled = 0;
        let mut overloads = Vec::new();
        for id in &services {
            let load = self.load_of(*id);
            let capacity = self.capacity(*id);
            handled += load.min(capacity);
            if load > capacity {
                overloads.push(Overload {
                    player: self.player,
                    service: *id,
                    load,
                    capacity,
                });
            }
        }
        Flow {
            handled,
            service_count: services.len(),
            overloads,
            cascades: self.cascades,
        }
    }

    /// Splits volume across entries by effective capacity, then each entry
    /// shares its part with its direct downstream services by remaining
    /// capacity. Requests lost to connection latency are simply gone.
    fn distribute(&mut self, volume: u32, entries: &[ServiceId]) {
        let weights: Vec<u32> = entries.iter().map(|id| self.capacity(*id)).collect();
        let shares = apportion(volume, &weights);
        for (entry, share) in entries.iter().zip(shares) {
            let links = self.links(*entry);
            let mut targets: Vec<(ServiceId, u32)> = vec![(*entry, 0)];
            targets.extend(links);
            let weights: Vec<u32> = targets.iter().map(|(id, _)| self.remaining(*id)).collect();
            for ((target, latency), part) in targets.into_iter().zip(apportion(share, &weights)) {
                let arriving = part.saturating_sub(latency);
                *self.load.entry(target).or_insert(0) += arriving;
            }
        }
    }

    fn cascade(&mut self, origin: ServiceId, excess: u32) {
        *self.spilled.entry(origin).or_insert(0) += excess;
        let mut chain = CascadeChain {
            player: self.player,
            origin,
            path: vec![origin],
            absorbed: 0,
        };
        let mut visited = AHashSet::new();
        visited.insert(origin);
        self.spill(origin, excess, &mut visited, &mut chain);
        self.cascades.push(chain);
    }

    fn spill(
        &mut self,
        from: ServiceId,
        excess: u32,
        visited: &mut AHashSet<ServiceId>,
        chain: &mut CascadeChain,
    ) {
        let links = self.links(from);
        if links.is_empty() {
            chain.absorbed += excess;
            return;
        }
        let weights: Vec<u32> = links
            .iter()
            .map(|(to, _)| if visited.contains(to) { 0 } else { self.remaining(*to) })
            .collect();
        for ((to, latency), part) in links.into_iter().zip(apportion(excess, &weights)) {
            if part == 0 {
                continue;
            }
            let arriving = part.saturating_sub(latency);
            chain.absorbed += part - arriving;
            if !visited.insert(to) {
                chain.absorbed += arriving;
                continue;
            }
            chain.path.push(to);
            *self.load.entry(to).or_insert(0) += arriving;
            let overflow = self.unspilled(to);
            if overflow > 0 {
                *self.spilled.entry(to).or_insert(0) += overflow;
                self.spill(to, overflow, visited, chain);
            }
        }
    }
}

/// Largest-remainder split of `total` proportional to `weights`. Ties go to
/// the earlier index. All-zero weights split evenly.
pub(crate) fn apportion(total: u32, weights: &[u32]) -> Vec<u32> {
    if weights.is_empty() {
        return Vec::new();
    }
    let mut weights: Vec<u64> = weights.iter().map(|w| u64::from(*w)).collect();
    if weights.iter().all(|w| *w == 0) {
        weights.iter_mut().for_each(|w| *w = 1);
    }
    let sum: u64 = weights.iter().sum();
    let total_wide = u64::from(total);

    let mut parts: Vec<u32> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(u64, usize)> = Vec::with_capacity(weights.len());
    for (index, weight) in weights.iter().enumerate() {
        let exact = total_wide * weight;
        parts.push(u32::try_from(exact / sum).unwrap_or(total));
        remainders.push((exact % sum, index));
    }
    let assigned: u32 = parts.iter().sum();
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, index) in remainders.into_iter().take((total - assigned) as usize) {
        parts[index] += 1;
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{base_config, base_state, build_at};
    use crate::{HexCoord, ServiceType};

    fn resolve_with(state: &mut GameState, volume: u32) -> ResolutionReport {
        let config = base_config();
        let mut volumes = vec![0; state.players.len()];
        volumes[0] = volume;
        state.pending_traffic = Some(volumes);
        resolve_round(state, &mut Dice::from_seed(0), &config)
    }

    #[test]
    fn apportion_is_exact_and_stable() {
        assert_eq!(apportion(10, &[1, 1, 1]), vec![4, 3, 3]);
        assert_eq!(apportion(7, &[0, 0]), vec![4, 3]);
        assert_eq!(apportion(9, &[10, 5, 0]), vec![6, 3, 0]);
        assert_eq!(apportion(0, &[3, 4]), vec![0, 0]);
        assert!(apportion(5, &[]).is_empty());
    }

    #[test]
    fn no_entry_services_drop_everything() {
        let mut state = base_state(&base_config());
        build_at(&mut state, PlayerId(0), ServiceType::Compute, HexCoord::new(1, 1));
        let report = resolve_with(&mut state, 12);
        let mine = &report.players[0];
        assert_eq!((mine.handled, mine.dropped), (0, 12));
        assert!(mine.overloaded.is_empty());
        assert!(report.cascades.is_empty());
    }

    #[test]
    fn idle_services_without_entry_keep_full_uptime() {
        let mut state = base_state(&base_config());
        build_at(&mut state, PlayerId(0), ServiceType::Compute, HexCoord::new(1, 1));
        state.players[0].uptime = 0.0;

        let report = resolve_with(&mut state, 5);
        let mine = &report.players[0];
        assert!(mine.overloaded.is_empty());
        assert!((mine.instantaneous_uptime - 100.0).abs() < 1e-9);
        assert!((state.players[0].uptime - 50.0).abs() < 1e-9);
    }

    #[test]
    fn no_services_means_zero_uptime() {
        let mut state = base_state(&base_config());
        let report = resolve_with(&mut state, 5);
        assert!(report.players[0].instantaneous_uptime.abs() < 1e-9);
        assert_eq!(report.players[0].dropped, 5);
    }

    #[test]
    fn entry_within_capacity_handles_all() {
        let mut state = base_state(&base_config());
        build_at(&mut state, PlayerId(0), ServiceType::LoadBalancer, HexCoord::new(1, 1));
        let report = resolve_with(&mut state, 8);
        assert_eq!(report.players[0].handled, 8);
        assert_eq!(report.players[0].dropped, 0);
        assert!((state.players[0].uptime - 100.0).abs() < 1e-9);
    }

    #[test]
    fn entry_shares_with_downstream_by_remaining_capacity() {
        let mut state = base_state(&base_config());
        let lb = build_at(&mut state, PlayerId(0), ServiceType::LoadBalancer, HexCoord::new(1, 1));
        let db = build_at(&mut state, PlayerId(0), ServiceType::Database, HexCoord::new(1, 2));
        state.insert_connection(lb, db).unwrap();
        let report = resolve_with(&mut state, 13);
        // 13 split 10:3 between the balancer and the database.
        assert_eq!(report.players[0].handled, 13);
        assert!(report.overloads.is_empty());
    }

    #[test]
    fn overload_cascades_downstream_in_creation_order() {
        let mut state = base_state(&base_config());
        let gw = build_at(&mut state, PlayerId(0), ServiceType::ApiGateway, HexCoord::new(2, 2));
        let a = build_at(&mut state, PlayerId(0), ServiceType::Database, HexCoord::new(2, 3));
        let b = build_at(&mut state, PlayerId(0), ServiceType::Compute, HexCoord::new(3, 3));
        state.insert_connection(gw, a).unwrap();
        state.insert_connection(a, b).unwrap();

        // 20 split 14:6 between gateway and database. The gateway's excess
        // lands on the full database, which pushes everything on to the
        // compute node, which has nowhere left to send its own excess.
        let report = resolve_with(&mut state, 20);
        let overloaded: Vec<ServiceId> = report.overloads.iter().map(|o| o.service).collect();
        assert_eq!(overloaded, vec![gw, a, b]);
        assert_eq!(report.cascades.len(), 1);
        assert_eq!(report.cascades[0].origin, gw);
        assert_eq!(report.cascades[0].path, vec![gw, a, b]);
        assert_eq!(report.cascades[0].absorbed, 5);
        let player = &report.players[0];
        assert_eq!((player.handled, player.dropped), (15, 5));
        assert_eq!(state.services[&gw].bugs, 1);
        assert_eq!(state.services[&b].bugs, 1);
    }

    #[test]
    fn cycles_terminate_and_absorb_failure() {
        let mut state = base_state(&base_config());
        let lb = build_at(&mut state, PlayerId(0), ServiceType::LoadBalancer, HexCoord::new(2, 2));
        let a = build_at(&mut state, PlayerId(0), ServiceType::Database, HexCoord::new(2, 3));
        state.insert_connection(lb, a).unwrap();
        state.insert_connection(a, lb).unwrap();

        let report = resolve_with(&mut state, 20);
        let player = &report.players[0];
        assert_eq!(player.handled, 13);
        assert_eq!(player.dropped, 7);
        assert!(report.cascades.iter().all(|c| c.path.len() <= 2));
    }

    #[test]
    fn latency_loses_requests_in_transit() {
        let mut state = base_state(&base_config());
        let lb = build_at(&mut state, PlayerId(0), ServiceType::LoadBalancer, HexCoord::new(1, 1));
        let cache = build_at(&mut state, PlayerId(0), ServiceType::Cache, HexCoord::new(1, 2));
        let link = state.insert_connection(lb, cache).unwrap();
        state.connections.get_mut(&link).unwrap().latency = 2;

        let report = resolve_with(&mut state, 18);
        // 18 split 10:8; two of the cache's eight time out on the way.
        assert_eq!(report.players[0].handled, 16);
        assert_eq!(report.players[0].dropped, 2);
    }

    #[test]
    fn uptime_moves_halfway_toward_observation() {
        let mut state = base_state(&base_config());
        let gw = build_at(&mut state, PlayerId(0), ServiceType::ApiGateway, HexCoord::new(1, 1));
        build_at(&mut state, PlayerId(0), ServiceType::Queue, HexCoord::new(4, 4));
        state.services.get_mut(&gw).unwrap().capacity = 1;

        let report = resolve_with(&mut state, 10);
        assert!((report.players[0].instantaneous_uptime - 50.0).abs() < 1e-9);
        assert!((state.players[0].uptime - 75.0).abs() < 1e-9);
        assert_eq!(state.players[0].uptime_history.len(), 1);
    }

    #[test]
    fn rolled_traffic_is_two_to_twenty() {
        let config = base_config();
        let mut state = base_state(&config);
        let mut dice = Dice::from_seed(11);
        let rolls = roll_traffic(&mut state, &mut dice, &config);
        assert_eq!(rolls.len(), 4);
        for roll in rolls {
            assert_eq!(roll.dice.len(), 2);
            assert!((2..=20).contains(&roll.volume));
        }
        assert!(state.pending_traffic.is_some());
    }
}
