use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use yrs::updates::encoder::Encode;

use super::connection::{
    Connection, ConnectionId, SendError, CLOSE_INTERNAL_ERROR, CLOSE_TRY_AGAIN_LATER,
};
use super::registry::ConnectionRegistry;
use super::room::Room;
use crate::sync::crdt::{SharedDocument, YrsDocument};
use crate::sync::handler::{self, Outgoing};
use crate::sync::protocol::encode_awareness;

/// Live counts across all rooms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub rooms: usize,
    pub connections: usize,
    pub awareness_clients: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub exists: bool,
    pub connections: usize,
    pub awareness_clients: usize,
    pub created_at: Option<DateTime<Utc>>,
}

/// Latest merged state of a room, as handed to the persistence side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub update: Vec<u8>,
    pub state_vector: Vec<u8>,
}

/// Owns every room and the registry of connections in them.
///
/// All methods are synchronous: they run on the hub loop one command at a
/// time, so join/leave/frame handling never interleave.
pub struct RoomManager<D = YrsDocument> {
    rooms: HashMap<String, Room<D>>,
    registry: ConnectionRegistry,
}

impl<D: SharedDocument> Default for RoomManager<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: SharedDocument> RoomManager<D> {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
            registry: ConnectionRegistry::default(),
        }
    }

    /// Adds `connection` to `room_id`, creating the room if needed, and sends
    /// it the room's current state. Returns false if it was already a member.
    pub fn join(&mut self, room_id: &str, connection: Connection) -> bool {
        let id = connection.id;
        if self.registry.is_member(room_id, id) {
            debug!("Connection {} already joined room {}", id, room_id);
            return false;
        }
        if self.registry.get(id).is_some() {
            self.leave(id);
        }

        let room = self.rooms.entry(room_id.to_string()).or_insert_with(|| {
            info!("Creating room {}", room_id);
            Room::new(room_id)
        });
        let frames = handler::initial_sync(room);
        self.registry.insert(room_id, connection);
        info!(
            "Connection {} joined room {} ({} members)",
            id,
            room_id,
            self.registry.member_count(room_id)
        );

        for frame in frames {
            if let Err(e) = self.send_to(id, frame) {
                warn!("Initial sync to {} failed: {:?}", id, e);
                self.evict(id, CLOSE_TRY_AGAIN_LATER);
                break;
            }
        }
        true
    }

    /// Removes a connection, retracts its presence from the remaining members
    /// and discards the room if it was the last member.
    pub fn leave(&mut self, id: ConnectionId) -> bool {
        match self.remove(id, None) {
            Some(failed) => {
                self.evict_all(failed, CLOSE_TRY_AGAIN_LATER);
                true
            }
            None => false,
        }
    }

    /// Removes a connection and tells its transport to close with `code`.
    pub fn evict(&mut self, id: ConnectionId, code: u16) {
        self.evict_all(vec![id], code);
    }

    /// Sends `payload` to every member of `room_id` except `exclude`. Members
    /// whose queue is full or gone are evicted; the rest still get the frame.
    pub fn broadcast(&mut self, room_id: &str, payload: &[u8], exclude: Option<ConnectionId>) {
        let failed = self.deliver(room_id, payload, exclude);
        self.evict_all(failed, CLOSE_TRY_AGAIN_LATER);
    }

    /// Runs one inbound frame through the sync handler and routes the result.
    /// A frame that fails to decode or merge closes its sender only.
    pub fn handle_frame(&mut self, id: ConnectionId, data: &[u8]) {
        let Some(connection) = self.registry.get_mut(id) else {
            debug!("Dropping frame from departed connection {}", id);
            return;
        };
        connection.touch();
        let Some(room_id) = connection.room_id.clone() else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };

        match handler::handle_frame(room, id, data) {
            Ok(outgoing) => {
                for out in outgoing {
                    match out {
                        Outgoing::Reply(frame) => {
                            if let Err(e) = self.send_to(id, frame) {
                                warn!("Reply to {} failed: {:?}", id, e);
                                self.evict(id, CLOSE_TRY_AGAIN_LATER);
                                return;
                            }
                        }
                        Outgoing::Broadcast(frame) => self.broadcast(&room_id, &frame, Some(id)),
                    }
                }
            }
            Err(e) => {
                warn!("Closing connection {} in room {}: {}", id, room_id, e);
                self.evict(id, CLOSE_INTERNAL_ERROR);
            }
        }
    }

    /// Closes every connection, e.g. on shutdown.
    pub fn close_all(&mut self, code: u16) {
        let ids = self.registry.connection_ids();
        info!("Closing {} connections", ids.len());
        for id in ids {
            if let Some(mut connection) = self.registry.remove(id) {
                connection.close(code);
            }
        }
        self.rooms.clear();
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            rooms: self.rooms.len(),
            connections: self.registry.connection_count(),
            awareness_clients: self.rooms.values().map(|r| r.awareness.client_count()).sum(),
        }
    }

    pub fn room_info(&self, room_id: &str) -> RoomInfo {
        match self.rooms.get(room_id) {
            Some(room) => RoomInfo {
                exists: true,
                connections: self.registry.member_count(room_id),
                awareness_clients: room.awareness.client_count(),
                created_at: Some(room.created_at),
            },
            None => RoomInfo {
                exists: false,
                connections: 0,
                awareness_clients: 0,
                created_at: None,
            },
        }
    }

    /// Latest merged state of a live room.
    pub fn snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        let room = self.rooms.get(room_id)?;
        Some(RoomSnapshot {
            update: room.doc.encode_state(),
            state_vector: room.doc.state_vector().encode_v1(),
        })
    }

    #[cfg(test)]
    pub fn members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.registry.members(room_id).collect()
    }

    fn send_to(&self, id: ConnectionId, frame: Vec<u8>) -> Result<(), SendError> {
        match self.registry.get(id) {
            Some(connection) => connection.try_send(frame),
            None => Err(SendError::Closed),
        }
    }

    fn deliver(&self, room_id: &str, payload: &[u8], exclude: Option<ConnectionId>) -> Vec<ConnectionId> {
        let mut failed = Vec::new();
        for member in self.registry.members(room_id) {
            if Some(member) == exclude {
                continue;
            }
            match self.send_to(member, payload.to_vec()) {
                Ok(()) => {}
                Err(SendError::Full) => {
                    warn!("Outbound buffer of {} in room {} is full", member, room_id);
                    failed.push(member);
                }
                Err(SendError::Closed) => failed.push(member),
            }
        }
        failed
    }

    fn evict_all(&mut self, mut pending: Vec<ConnectionId>, code: u16) {
        // removing a member broadcasts its presence removal, which can in
        // turn overflow other members
        while let Some(id) = pending.pop() {
            if let Some(failed) = self.remove(id, Some(code)) {
                info!("Evicted connection {} (close code {})", id, code);
                pending.extend(failed);
            }
        }
    }

    /// Returns the members that could not be told about the removal, or None
    /// if `id` was not registered.
    fn remove(&mut self, id: ConnectionId, close: Option<u16>) -> Option<Vec<ConnectionId>> {
        let mut connection = self.registry.remove(id)?;
        if let Some(code) = close {
            connection.close(code);
        }
        let room_id = connection.room_id.take()?;
        let removal = self
            .rooms
            .get_mut(&room_id)
            .and_then(|room| room.awareness.remove(id));

        if self.registry.member_count(&room_id) == 0 {
            self.rooms.remove(&room_id);
            info!("Room {} is empty, discarding its state", room_id);
            return Some(Vec::new());
        }
        debug!(
            "Connection {} left room {} ({} members, last frame {:?} ago)",
            id,
            room_id,
            self.registry.member_count(&room_id),
            connection.last_seen.elapsed()
        );
        Some(match removal {
            Some(update) => self.deliver(&room_id, &encode_awareness(update), None),
            None => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::awareness::build_update;
    use crate::sync::crdt::test_support::{apply, insert_text, read_text};
    use crate::sync::handler::test_support::awareness_payload;
    use crate::sync::protocol::{decode_frame, encode_update};
    use yrs::sync::{Message, SyncMessage};
    use crate::ws::connection::ConnectionIo;
    use yrs::Doc;

    fn connect(manager: &mut RoomManager, room: &str, capacity: usize) -> (ConnectionId, ConnectionIo) {
        let (connection, io) = Connection::open(capacity);
        let id = connection.id;
        assert!(manager.join(room, connection));
        (id, io)
    }

    fn drain(io: &mut ConnectionIo) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Ok(frame) = io.frames.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Applies every document frame a client received, like a y-websocket
    /// provider would.
    fn replay(doc: &Doc, frames: &[Vec<u8>]) {
        for frame in frames {
            match decode_frame(frame).unwrap() {
                Message::Sync(SyncMessage::SyncStep2(update)) | Message::Sync(SyncMessage::Update(update)) => {
                    apply(doc, &update)
                }
                _ => {}
            }
        }
    }

    fn awareness_frame(client_id: u64, clock: u32, state: &str) -> Vec<u8> {
        encode_awareness(build_update([(client_id, clock, state)]))
    }

    #[test]
    fn join_creates_room_and_sends_sync() {
        let mut manager = RoomManager::new();
        let (id, mut io) = connect(&mut manager, "doc-42", 16);

        let frames = drain(&mut io);
        assert_eq!(frames.len(), 2);
        assert!(matches!(
            decode_frame(&frames[0]).unwrap(),
            Message::Sync(SyncMessage::SyncStep1(_))
        ));
        assert!(matches!(
            decode_frame(&frames[1]).unwrap(),
            Message::Sync(SyncMessage::SyncStep2(_))
        ));
        assert_eq!(manager.members("doc-42"), vec![id]);
        assert_eq!(manager.stats(), RelayStats { rooms: 1, connections: 1, awareness_clients: 0 });
    }

    #[test]
    fn joining_twice_is_a_no_op() {
        let mut manager: RoomManager = RoomManager::new();
        let (id, _io) = connect(&mut manager, "doc-42", 16);

        let (mut again, _io_again) = Connection::open(16);
        again.id = id;
        assert!(!manager.join("doc-42", again));
        assert_eq!(manager.stats().connections, 1);
    }

    #[test]
    fn joining_another_room_moves_the_connection() {
        let mut manager: RoomManager = RoomManager::new();
        let (id, _io) = connect(&mut manager, "doc-1", 16);

        let (mut moved, _io_moved) = Connection::open(16);
        moved.id = id;
        assert!(manager.join("doc-2", moved));
        assert!(!manager.room_info("doc-1").exists);
        assert_eq!(manager.members("doc-2"), vec![id]);
        assert_eq!(manager.stats().connections, 1);
    }

    #[test]
    fn updates_reach_everyone_but_the_sender() {
        let mut manager = RoomManager::new();
        let (a, mut io_a) = connect(&mut manager, "doc-42", 16);
        let (_b, mut io_b) = connect(&mut manager, "doc-42", 16);
        let (_c, mut io_c) = connect(&mut manager, "elsewhere", 16);
        drain(&mut io_a);
        drain(&mut io_b);
        drain(&mut io_c);

        let client = Doc::with_client_id(1);
        let frame = encode_update(&insert_text(&client, 0, "hello"));
        manager.handle_frame(a, &frame);

        assert!(drain(&mut io_a).is_empty());
        assert_eq!(drain(&mut io_b), vec![frame]);
        assert!(drain(&mut io_c).is_empty());
    }

    #[test]
    fn two_editors_converge() {
        let mut manager = RoomManager::new();
        let (a, mut io_a) = connect(&mut manager, "doc-42", 16);
        let (b, mut io_b) = connect(&mut manager, "doc-42", 16);
        let doc_a = Doc::with_client_id(1);
        let doc_b = Doc::with_client_id(2);
        replay(&doc_a, &drain(&mut io_a));
        replay(&doc_b, &drain(&mut io_b));

        manager.handle_frame(a, &encode_update(&insert_text(&doc_a, 0, "hello")));
        replay(&doc_b, &drain(&mut io_b));
        assert_eq!(read_text(&doc_b), "hello");

        // both edit before seeing each other's change
        let u2 = insert_text(&doc_b, 5, " world");
        let u3 = insert_text(&doc_a, 0, ">> ");
        manager.handle_frame(b, &encode_update(&u2));
        manager.handle_frame(a, &encode_update(&u3));
        replay(&doc_a, &drain(&mut io_a));
        replay(&doc_b, &drain(&mut io_b));

        assert_eq!(read_text(&doc_a), read_text(&doc_b));
        assert_eq!(read_text(&doc_a), ">> hello world");

        let joiner = Doc::with_client_id(3);
        let snapshot = manager.snapshot("doc-42").unwrap();
        apply(&joiner, &snapshot.update);
        assert_eq!(read_text(&joiner), read_text(&doc_a));
    }

    #[test]
    fn delivery_order_does_not_change_room_state() {
        let writers: Vec<Doc> = (1..=3).map(Doc::with_client_id).collect();
        let updates: Vec<Vec<u8>> = writers
            .iter()
            .enumerate()
            .map(|(i, doc)| encode_update(&insert_text(doc, 0, &format!("edit-{i};"))))
            .collect();
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

        let mut results = Vec::new();
        for order in orders {
            let mut manager = RoomManager::new();
            let ids: Vec<ConnectionId> = (0..3)
                .map(|_| connect(&mut manager, "doc-42", 64).0)
                .collect();
            for i in order {
                manager.handle_frame(ids[i], &updates[i]);
                // duplicates are harmless
                manager.handle_frame(ids[i], &updates[i]);
            }
            let doc = Doc::new();
            apply(&doc, &manager.snapshot("doc-42").unwrap().update);
            results.push(read_text(&doc));
        }
        assert!(results.windows(2).all(|w| w[0] == w[1]), "{results:?}");
    }

    #[test]
    fn late_joiner_receives_current_state() {
        let mut manager = RoomManager::new();
        let (a, _io_a) = connect(&mut manager, "doc-42", 16);
        let writer = Doc::with_client_id(1);
        manager.handle_frame(a, &encode_update(&insert_text(&writer, 0, "already here")));

        let (_b, mut io_b) = connect(&mut manager, "doc-42", 16);
        let doc_b = Doc::with_client_id(2);
        replay(&doc_b, &drain(&mut io_b));
        assert_eq!(read_text(&doc_b), "already here");
    }

    #[test]
    fn leave_retracts_presence() {
        let mut manager = RoomManager::new();
        let (a, _io_a) = connect(&mut manager, "doc-42", 16);
        let (b, mut io_b) = connect(&mut manager, "doc-42", 16);
        manager.handle_frame(a, &awareness_frame(100, 3, r#"{"user":{"name":"Ann"}}"#));
        drain(&mut io_b);
        assert_eq!(manager.stats().awareness_clients, 1);

        assert!(manager.leave(a));
        let frames = drain(&mut io_b);
        assert_eq!(frames.len(), 1);
        let update = awareness_payload(&frames[0]);
        assert_eq!(update.clients.len(), 1);
        let entry = &update.clients[&100];
        assert_eq!(entry.clock, 4);
        assert_eq!(entry.json.as_ref(), "null");

        assert_eq!(manager.members("doc-42"), vec![b]);
        assert_eq!(manager.stats().awareness_clients, 0);
        assert!(!manager.leave(a));
    }

    #[test]
    fn presence_echoed_by_a_peer_is_still_retracted_with_its_owner() {
        let mut manager = RoomManager::new();
        let (a, _io_a) = connect(&mut manager, "doc-42", 16);
        let (b, mut io_b) = connect(&mut manager, "doc-42", 16);
        let (_c, mut io_c) = connect(&mut manager, "doc-42", 16);

        // y-websocket providers re-broadcast every awareness change they apply
        let presence = awareness_frame(100, 1, r#"{"user":{"name":"Ann"}}"#);
        manager.handle_frame(a, &presence);
        manager.handle_frame(b, &presence);
        manager.handle_frame(b, &awareness_frame(100, 2, r#"{"user":{"name":"Ann"},"cursor":4}"#));
        drain(&mut io_b);
        drain(&mut io_c);
        assert_eq!(manager.stats().awareness_clients, 1);

        assert!(manager.leave(a));
        for io in [&mut io_b, &mut io_c] {
            let frames = drain(io);
            assert_eq!(frames.len(), 1);
            let update = awareness_payload(&frames[0]);
            let entry = &update.clients[&100];
            assert_eq!(entry.clock, 3);
            assert_eq!(entry.json.as_ref(), "null");
        }
        assert_eq!(manager.stats().awareness_clients, 0);

        // b leaving later has nothing left to retract
        assert!(manager.leave(b));
        assert!(drain(&mut io_c).is_empty());
    }

    #[test]
    fn empty_room_is_discarded_and_recreated_blank() {
        let mut manager = RoomManager::new();
        let (a, _io_a) = connect(&mut manager, "doc-42", 16);
        let writer = Doc::with_client_id(1);
        manager.handle_frame(a, &encode_update(&insert_text(&writer, 0, "gone soon")));
        manager.leave(a);
        assert_eq!(manager.stats(), RelayStats::default());
        assert!(manager.snapshot("doc-42").is_none());

        let (_b, mut io_b) = connect(&mut manager, "doc-42", 16);
        let doc_b = Doc::with_client_id(2);
        replay(&doc_b, &drain(&mut io_b));
        assert_eq!(read_text(&doc_b), "");
    }

    #[test]
    fn malformed_frame_closes_only_the_sender() {
        let mut manager = RoomManager::new();
        let (a, mut io_a) = connect(&mut manager, "doc-42", 16);
        let (b, mut io_b) = connect(&mut manager, "doc-42", 16);
        drain(&mut io_b);

        manager.handle_frame(a, &[0x09, 0x01]);
        assert_eq!(io_a.kill.try_recv().unwrap(), CLOSE_INTERNAL_ERROR);
        assert_eq!(manager.members("doc-42"), vec![b]);

        let (_c, mut io_c) = connect(&mut manager, "doc-42", 16);
        drain(&mut io_c);
        let writer = Doc::with_client_id(1);
        let frame = encode_update(&insert_text(&writer, 0, "still works"));
        manager.handle_frame(b, &frame);
        assert_eq!(drain(&mut io_c), vec![frame]);

        // frames racing in from the closed connection are dropped
        manager.handle_frame(a, &encode_update(&insert_text(&writer, 0, "late")));
        assert!(drain(&mut io_c).is_empty());
    }

    #[test]
    fn slow_reader_is_evicted_without_blocking_others() {
        let mut manager = RoomManager::new();
        let (a, _io_a) = connect(&mut manager, "doc-42", 64);
        let (slow, mut io_slow) = connect(&mut manager, "doc-42", 4);
        let (_fast, mut io_fast) = connect(&mut manager, "doc-42", 64);
        drain(&mut io_fast);

        let writer = Doc::with_client_id(1);
        for i in 0..4 {
            manager.handle_frame(a, &encode_update(&insert_text(&writer, i, "x")));
        }

        assert_eq!(io_slow.kill.try_recv().unwrap(), CLOSE_TRY_AGAIN_LATER);
        assert!(!manager.members("doc-42").contains(&slow));
        assert_eq!(drain(&mut io_fast).len(), 4);
        assert_eq!(manager.stats().connections, 2);
    }

    #[test]
    fn room_info_reflects_membership() {
        let mut manager: RoomManager = RoomManager::new();
        assert!(!manager.room_info("doc-42").exists);
        let (_a, _io_a) = connect(&mut manager, "doc-42", 16);
        let info = manager.room_info("doc-42");
        assert!(info.exists);
        assert_eq!(info.connections, 1);
        assert!(info.created_at.is_some());
    }

    #[test]
    fn close_all_signals_every_transport() {
        let mut manager: RoomManager = RoomManager::new();
        let (_a, mut io_a) = connect(&mut manager, "doc-1", 16);
        let (_b, mut io_b) = connect(&mut manager, "doc-2", 16);
        manager.close_all(1001);
        assert_eq!(io_a.kill.try_recv().unwrap(), 1001);
        assert_eq!(io_b.kill.try_recv().unwrap(), 1001);
        assert_eq!(manager.stats(), RelayStats::default());
    }
}
