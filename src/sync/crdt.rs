use yrs::updates::decoder::Decode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

use super::protocol::ProtocolError;

/// Merge engine behind a room's shared state.
///
/// The relay never looks inside a document; it only needs merging, diffing
/// against a remote state vector and the local state vector. Implementations
/// must merge idempotently and commutatively.
pub trait SharedDocument: Default + Send + 'static {
    /// Merges an encoded update into the document. On error the document is
    /// left as it was.
    fn apply_update(&mut self, update: &[u8]) -> Result<(), ProtocolError>;

    /// Encodes everything the holder of `remote` is missing.
    fn encode_diff(&self, remote: &StateVector) -> Vec<u8>;

    /// The full state as a single update.
    fn encode_state(&self) -> Vec<u8> {
        self.encode_diff(&StateVector::default())
    }

    fn state_vector(&self) -> StateVector;
}

/// Yjs compatible document backed by `yrs`.
pub struct YrsDocument {
    doc: Doc,
}

impl Default for YrsDocument {
    fn default() -> Self {
        Self { doc: Doc::new() }
    }
}

impl SharedDocument for YrsDocument {
    fn apply_update(&mut self, update: &[u8]) -> Result<(), ProtocolError> {
        let update = Update::decode_v1(update).map_err(|e| ProtocolError::Merge(e.to_string()))?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update)
            .map_err(|e| ProtocolError::Merge(e.to_string()))
    }

    fn encode_diff(&self, remote: &StateVector) -> Vec<u8> {
        self.doc.transact().encode_state_as_update_v1(remote)
    }

    fn state_vector(&self) -> StateVector {
        self.doc.transact().state_vector()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use yrs::{Doc, GetString, ReadTxn, Transact, Text, WriteTxn};

    pub const TEXT: &str = "content";

    /// Inserts `chunk` into the shared text of a client doc and returns the
    /// resulting incremental update.
    pub fn insert_text(doc: &Doc, index: u32, chunk: &str) -> Vec<u8> {
        let before = doc.transact().state_vector();
        {
            let mut txn = doc.transact_mut();
            let text = txn.get_or_insert_text(TEXT);
            text.insert(&mut txn, index, chunk);
        }
        doc.transact().encode_state_as_update_v1(&before)
    }

    pub fn apply(doc: &Doc, update: &[u8]) {
        use yrs::updates::decoder::Decode;
        let update = yrs::Update::decode_v1(update).unwrap();
        doc.transact_mut().apply_update(update).unwrap();
    }

    pub fn read_text(doc: &Doc) -> String {
        let txn = doc.transact();
        txn.get_text(TEXT)
            .map(|text| text.get_string(&txn))
            .unwrap_or_default()
    }
}
