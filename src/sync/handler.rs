//! Per-frame sync logic: decode, update room state, decide who hears about it.

use tracing::debug;
use yrs::sync::{Message, SyncMessage};

use super::crdt::SharedDocument;
use super::protocol::{
    decode_frame, encode_awareness, encode_sync_step1, encode_sync_step2, encode_update, ProtocolError,
};
use crate::ws::connection::ConnectionId;
use crate::ws::room::Room;

/// Where an outgoing frame goes.
#[derive(Debug, PartialEq, Eq)]
pub enum Outgoing {
    /// Only to the connection that sent the frame.
    Reply(Vec<u8>),
    /// To every other member of the room.
    Broadcast(Vec<u8>),
}

/// Frames a newly joined connection receives: the room's state vector (so it
/// sends back what the room lacks), the full merged state, and the current
/// awareness set if anyone has announced presence.
pub fn initial_sync<D: SharedDocument>(room: &Room<D>) -> Vec<Vec<u8>> {
    let mut frames = vec![
        encode_sync_step1(room.doc.state_vector()),
        encode_sync_step2(&room.doc.encode_state()),
    ];
    if let Some(awareness) = room.awareness.snapshot() {
        frames.push(encode_awareness(awareness));
    }
    frames
}

/// Processes one inbound frame from `conn`. On error the room is unchanged.
pub fn handle_frame<D: SharedDocument>(
    room: &mut Room<D>,
    conn: ConnectionId,
    data: &[u8],
) -> Result<Vec<Outgoing>, ProtocolError> {
    let out = match decode_frame(data)? {
        Message::Sync(SyncMessage::SyncStep1(state_vector)) => {
            let diff = room.doc.encode_diff(&state_vector);
            vec![Outgoing::Reply(encode_sync_step2(&diff))]
        }
        Message::Sync(SyncMessage::SyncStep2(update)) => {
            // peers did not ask for a step 2, so it travels on as a plain update
            room.doc.apply_update(&update)?;
            vec![Outgoing::Broadcast(encode_update(&update))]
        }
        Message::Sync(SyncMessage::Update(update)) => {
            room.doc.apply_update(&update)?;
            vec![Outgoing::Broadcast(data.to_vec())]
        }
        Message::Awareness(update) => {
            room.awareness.apply(conn, &update)?;
            vec![Outgoing::Broadcast(data.to_vec())]
        }
        Message::AwarenessQuery => room
            .awareness
            .snapshot()
            .map(|all| Outgoing::Reply(encode_awareness(all)))
            .into_iter()
            .collect(),
        Message::Auth(_) => {
            debug!("Ignoring auth frame from {} in room {}", conn, room.id);
            Vec::new()
        }
        Message::Custom(tag, _) => return Err(ProtocolError::UnknownMessageType(tag)),
    };
    Ok(out)
}
