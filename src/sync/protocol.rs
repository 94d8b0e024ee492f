//! Frame layer of the y-protocols sync/awareness exchange.
//!
//! ```text
//! sync       := varuint(0) varuint(subtype) varbytes(payload)
//! awareness  := varuint(1) varbytes(awareness update)
//! auth       := varuint(2) ...
//! query      := varuint(3)
//! ```
//!
//! Decoding and encoding go through `yrs::sync`; this module only adds the
//! relay's stricter framing checks and its error type.

use thiserror::Error;
use yrs::encoding::read::{self, Cursor};
use yrs::sync::awareness::AwarenessUpdate;
use yrs::sync::{Message, SyncMessage};
use yrs::updates::decoder::{Decode, Decoder, DecoderV1};
use yrs::updates::encoder::Encode;
use yrs::StateVector;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Decode(#[from] read::Error),
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("awareness client id {0} is out of range")]
    InvalidClientId(u64),
    #[error("crdt merge failed: {0}")]
    Merge(String),
}

/// Decodes one WebSocket message as a single y-protocols frame.
pub fn decode_frame(data: &[u8]) -> Result<Message, ProtocolError> {
    let mut decoder = DecoderV1::new(Cursor::new(data));
    let message = Message::decode(&mut decoder)?;
    let rest = decoder.read_to_end()?;
    if !rest.is_empty() {
        return Err(ProtocolError::TrailingBytes(rest.len()));
    }
    Ok(message)
}

pub fn encode_sync_step1(state_vector: StateVector) -> Vec<u8> {
    Message::Sync(SyncMessage::SyncStep1(state_vector)).encode_v1()
}

pub fn encode_sync_step2(update: &[u8]) -> Vec<u8> {
    Message::Sync(SyncMessage::SyncStep2(update.to_vec())).encode_v1()
}

pub fn encode_update(update: &[u8]) -> Vec<u8> {
    Message::Sync(SyncMessage::Update(update.to_vec())).encode_v1()
}

pub fn encode_awareness(update: AwarenessUpdate) -> Vec<u8> {
    Message::Awareness(update).encode_v1()
}
