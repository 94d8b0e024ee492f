pub mod awareness;
pub mod crdt;
pub mod handler;
pub mod protocol;
