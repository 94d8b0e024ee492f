use std::collections::{HashMap, HashSet};

use super::connection::{Connection, ConnectionId};

/// Index of live connections: connection -> room and room -> members.
///
/// The registry owns every `Connection`. A connection is indexed under at most
/// one room.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    members: HashMap<String, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    /// Registers `connection` as a member of `room_id`. Returns false, leaving
    /// the registry untouched, if the id is already registered.
    pub fn insert(&mut self, room_id: &str, mut connection: Connection) -> bool {
        if self.connections.contains_key(&connection.id) {
            return false;
        }
        connection.room_id = Some(room_id.to_string());
        self.members
            .entry(room_id.to_string())
            .or_default()
            .insert(connection.id);
        self.connections.insert(connection.id, connection);
        true
    }

    /// Unregisters a connection and hands ownership back to the caller.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        if let Some(room_id) = &connection.room_id {
            if let Some(members) = self.members.get_mut(room_id) {
                members.remove(&id);
                if members.is_empty() {
                    self.members.remove(room_id);
                }
            }
        }
        Some(connection)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    #[cfg(test)]
    pub fn room_of(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id)?.room_id.as_deref()
    }

    pub fn is_member(&self, room_id: &str, id: ConnectionId) -> bool {
        self.members
            .get(room_id)
            .is_some_and(|members| members.contains(&id))
    }

    pub fn members(&self, room_id: &str) -> impl Iterator<Item = ConnectionId> + '_ {
        self.members
            .get(room_id)
            .into_iter()
            .flat_map(|members| members.iter().copied())
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.members.get(room_id).map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }
}
