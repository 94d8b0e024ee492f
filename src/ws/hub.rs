use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit};
use tracing::{debug, info};

use super::connection::{Connection, ConnectionId};
use super::manager::{RelayStats, RoomInfo, RoomManager, RoomSnapshot};
use crate::sync::crdt::{SharedDocument, YrsDocument};

/// Requests processed by the hub loop, in arrival order.
pub enum Command {
    Join {
        room_id: String,
        connection: Connection,
    },
    Frame {
        conn_id: ConnectionId,
        data: Vec<u8>,
        /// Returned to the connection's inbound quota once processed.
        permit: OwnedSemaphorePermit,
    },
    Leave {
        conn_id: ConnectionId,
    },
    Stats {
        reply: oneshot::Sender<RelayStats>,
    },
    RoomInfo {
        room_id: String,
        reply: oneshot::Sender<RoomInfo>,
    },
    Snapshot {
        room_id: String,
        reply: oneshot::Sender<Option<RoomSnapshot>>,
    },
    Shutdown {
        code: u16,
    },
}

/// Cheap handle used by transports and HTTP handlers to reach the hub.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl HubHandle {
    /// Returns false once the hub loop has stopped.
    pub fn join(&self, room_id: &str, connection: Connection) -> bool {
        self.send(Command::Join {
            room_id: room_id.to_string(),
            connection,
        })
    }

    pub fn frame(&self, conn_id: ConnectionId, data: Vec<u8>, permit: OwnedSemaphorePermit) -> bool {
        self.send(Command::Frame { conn_id, data, permit })
    }

    pub fn leave(&self, conn_id: ConnectionId) -> bool {
        self.send(Command::Leave { conn_id })
    }

    pub fn shutdown(&self, code: u16) -> bool {
        self.send(Command::Shutdown { code })
    }

    pub async fn stats(&self) -> Option<RelayStats> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats { reply });
        rx.await.ok()
    }

    pub async fn room_info(&self, room_id: &str) -> Option<RoomInfo> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RoomInfo {
            room_id: room_id.to_string(),
            reply,
        });
        rx.await.ok()
    }

    /// `None` if the hub is gone, `Some(None)` if the room is not live.
    pub async fn snapshot(&self, room_id: &str) -> Option<Option<RoomSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot {
            room_id: room_id.to_string(),
            reply,
        });
        rx.await.ok()
    }

    fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }
}

/// The single authority over room and connection state in this process.
pub struct Hub<D = YrsDocument> {
    manager: RoomManager<D>,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl<D: SharedDocument> Hub<D> {
    pub fn new() -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            manager: RoomManager::new(),
            rx,
        };
        (hub, HubHandle { tx })
    }

    /// Processes commands until every handle is dropped.
    pub async fn run(mut self) {
        info!("Relay hub started");
        while let Some(command) = self.rx.recv().await {
            self.dispatch(command);
        }
        debug!("Relay hub stopped");
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::Join { room_id, connection } => {
                self.manager.join(&room_id, connection);
            }
            Command::Frame { conn_id, data, permit } => {
                self.manager.handle_frame(conn_id, &data);
                drop(permit);
            }
            Command::Leave { conn_id } => {
                if self.manager.leave(conn_id) {
                    info!("Connection {} closed", conn_id);
                }
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.manager.stats());
            }
            Command::RoomInfo { room_id, reply } => {
                let _ = reply.send(self.manager.room_info(&room_id));
            }
            Command::Snapshot { room_id, reply } => {
                let _ = reply.send(self.manager.snapshot(&room_id));
            }
            Command::Shutdown { code } => self.manager.close_all(code),
        }
    }
}

/// Starts the hub loop on the current runtime.
pub fn spawn_hub() -> HubHandle {
    let (hub, handle) = Hub::<YrsDocument>::new();
    tokio::spawn(hub.run());
    handle
}
