pub mod connection;
pub mod hub;
pub mod manager;
pub mod registry;
pub mod room;
