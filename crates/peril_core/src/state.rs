//! Arena helpers on `GameState`. These are the only places services and
//! connections are created or destroyed, so the grid index, owner lists and
//! outbound lists never drift apart.

use smallvec::SmallVec;

use crate::grid::HexCoord;
use crate::{
    Connection, ConnectionId, GameState, Player, PlayerId, Service, ServiceId, ServiceType,
};

impl GameState {
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id.index())
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id.index())
    }

    pub fn active_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_active())
    }

    pub fn service(&self, id: ServiceId) -> Option<&Service> {
        self.services.get(&id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// A player's services in creation order.
    pub fn services_of(&self, player: PlayerId) -> Vec<&Service> {
        self.player(player)
            .map(|p| p.services.iter().filter_map(|id| self.services.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn connection_between(&self, from: ServiceId, to: ServiceId) -> Option<ConnectionId> {
        let service = self.services.get(&from)?;
        service
            .outbound
            .iter()
            .copied()
            .find(|id| self.connections.get(id).is_some_and(|c| c.to == to))
    }

    /// Places a new service. Returns `None` when the cell is unavailable or
    /// the owner does not exist; callers validate beforehand.
    pub(crate) fn insert_service(
        &mut self,
        owner: PlayerId,
        service_type: ServiceType,
        location: HexCoord,
        capacity: u32,
    ) -> Option<ServiceId> {
        if self.player(owner).is_none() || !self.grid.is_free(location) {
            return None;
        }
        let id = ServiceId(self.counters.next_service_id);
        self.counters.next_service_id += 1;
        self.grid.place(location, id);
        self.services.insert(
            id,
            Service {
                id,
                service_type,
                owner,
                location,
                capacity,
                max_capacity: capacity,
                upgrades: 0,
                bugs: 0,
                latency: 0,
                shields: 0,
                outbound: SmallVec::new(),
                built_round: self.round,
            },
        );
        if let Some(player) = self.player_mut(owner) {
            player.services.push(id);
        }
        Some(id)
    }

    /// Removes a service together with every connection touching it.
    pub(crate) fn remove_service(&mut self, id: ServiceId) -> Option<Service> {
        let service = self.services.remove(&id)?;
        self.grid.clear(service.location);

        let doomed: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.from == id || c.to == id)
            .map(|c| c.id)
            .collect();
        for connection_id in &doomed {
            if let Some(connection) = self.connections.remove(connection_id) {
                if let Some(upstream) = self.services.get_mut(&connection.from) {
                    upstream.outbound.retain(|c| *c != connection.id);
                }
            }
        }

        if let Some(owner) = self.player_mut(service.owner) {
            owner.services.retain(|s| *s != id);
        }
        Some(service)
    }

    pub(crate) fn insert_connection(
        &mut self,
        from: ServiceId,
        to: ServiceId,
    ) -> Option<ConnectionId> {
        if !self.services.contains_key(&to) {
            return None;
        }
        let id = ConnectionId(self.counters.next_connection_id);
        let upstream = self.services.get_mut(&from)?;
        upstream.outbound.push(id);
        self.counters.next_connection_id += 1;
        self.connections.insert(
            id,
            Connection {
                id,
                from,
                to,
                latency: 0,
            },
        );
        Some(id)
    }
}
