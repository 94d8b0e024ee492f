//! Presence tracking for one room.
//!
//! Awareness updates carry `(client id, clock, json state)` triples. The relay
//! applies them with the y-protocols rules and remembers which connection
//! introduced each client id, so everything a connection announced can be
//! retracted when it closes. Peers re-broadcast the presence of others, so an
//! update for a client id that is already present never changes its owner.

use std::collections::HashMap;
use std::sync::Arc;

use yrs::block::ClientID;
use yrs::sync::awareness::{AwarenessUpdate, AwarenessUpdateEntry};

use super::protocol::ProtocolError;
use crate::ws::connection::ConnectionId;

/// JSON state that marks a client as gone.
const REMOVED_STATE: &str = "null";

/// Largest client id a Yjs peer can produce (53-bit safe integer).
const MAX_CLIENT_ID: ClientID = (1 << 53) - 1;

#[derive(Debug)]
struct ClientMeta {
    clock: u32,
    /// `None` once the client has been removed; the clock is kept so stale
    /// updates for it are still recognised.
    state: Option<Arc<str>>,
    owner: Option<ConnectionId>,
}

/// Builds an awareness update from `(client id, clock, json state)` triples.
pub fn build_update<'a, I>(clients: I) -> AwarenessUpdate
where
    I: IntoIterator<Item = (ClientID, u32, &'a str)>,
{
    AwarenessUpdate {
        clients: clients
            .into_iter()
            .map(|(id, clock, json)| (id, AwarenessUpdateEntry { clock, json: json.into() }))
            .collect(),
    }
}

#[derive(Debug, Default)]
pub struct AwarenessTracker {
    clients: HashMap<ClientID, ClientMeta>,
}

impl AwarenessTracker {
    /// Applies an awareness update sent by `conn`. The update is validated
    /// completely before anything is stored.
    ///
    /// An entry wins when its clock is newer than the known one, or when it
    /// removes a present client at the same clock.
    pub fn apply(&mut self, conn: ConnectionId, update: &AwarenessUpdate) -> Result<(), ProtocolError> {
        if let Some(&id) = update.clients.keys().find(|&&id| id > MAX_CLIENT_ID) {
            return Err(ProtocolError::InvalidClientId(id));
        }

        for (&id, entry) in &update.clients {
            let removes = entry.json.as_ref() == REMOVED_STATE;
            let (known_clock, present) = self
                .clients
                .get(&id)
                .map(|meta| (meta.clock, meta.state.is_some()))
                .unwrap_or((0, false));
            if !(known_clock < entry.clock || (known_clock == entry.clock && removes && present)) {
                continue;
            }

            let meta = self.clients.entry(id).or_insert(ClientMeta {
                clock: entry.clock,
                state: None,
                owner: None,
            });
            meta.clock = entry.clock;
            if removes {
                meta.state = None;
                meta.owner = None;
            } else {
                if !present {
                    meta.owner = Some(conn);
                }
                meta.state = Some(entry.json.clone());
            }
        }
        Ok(())
    }

    /// Removes every client `conn` introduced and returns the update that
    /// retracts them, if there were any.
    pub fn remove(&mut self, conn: ConnectionId) -> Option<AwarenessUpdate> {
        let mut removed = HashMap::new();
        for (&id, meta) in self.clients.iter_mut() {
            if meta.owner != Some(conn) || meta.state.is_none() {
                continue;
            }
            meta.clock = meta.clock.saturating_add(1);
            meta.state = None;
            meta.owner = None;
            removed.insert(
                id,
                AwarenessUpdateEntry {
                    clock: meta.clock,
                    json: REMOVED_STATE.into(),
                },
            );
        }
        if removed.is_empty() {
            None
        } else {
            Some(AwarenessUpdate { clients: removed })
        }
    }

    /// Every present client as a single awareness update.
    pub fn snapshot(&self) -> Option<AwarenessUpdate> {
        let clients: HashMap<ClientID, AwarenessUpdateEntry> = self
            .clients
            .iter()
            .filter_map(|(&id, meta)| {
                let json = meta.state.clone()?;
                Some((id, AwarenessUpdateEntry { clock: meta.clock, json }))
            })
            .collect();
        if clients.is_empty() {
            None
        } else {
            Some(AwarenessUpdate { clients })
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.values().filter(|meta| meta.state.is_some()).count()
    }

    #[cfg(test)]
    pub fn state_of(&self, id: ClientID) -> Option<&str> {
        self.clients.get(&id).and_then(|meta| meta.state.as_deref())
    }

    #[cfg(test)]
    pub fn owner_of(&self, id: ClientID) -> Option<ConnectionId> {
        self.clients.get(&id).and_then(|meta| meta.owner)
    }
}
