use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

/// Unique connection ID (server-generated UUID).
pub type ConnectionId = Uuid;

/// Close codes sent to clients the relay disconnects.
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// A joining connection is sent up to three frames before it reads anything.
pub const MIN_OUTBOUND_BUFFER: usize = 4;

pub fn close_reason(code: u16) -> &'static str {
    match code {
        CLOSE_GOING_AWAY => "Server shutting down",
        CLOSE_INTERNAL_ERROR => "Server error while processing message",
        CLOSE_TRY_AGAIN_LATER => "Outbound buffer exceeded",
        _ => "",
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SendError {
    /// The peer is not draining its queue.
    Full,
    /// The writer side of the transport is gone.
    Closed,
}

/// The relay's side of one live transport session.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    /// Room this connection belongs to, set once it has joined.
    pub room_id: Option<String>,
    pub last_seen: Instant,
    outbound: mpsc::Sender<Vec<u8>>,
    kill: Option<oneshot::Sender<u16>>,
}

/// Transport side of a connection: frames to write, and the signal to stop.
pub struct ConnectionIo {
    pub frames: mpsc::Receiver<Vec<u8>>,
    pub kill: oneshot::Receiver<u16>,
}

impl Connection {
    /// Creates a connection with a bounded outbound queue of `capacity` frames.
    pub fn open(capacity: usize) -> (Self, ConnectionIo) {
        let (outbound, frames) = mpsc::channel(capacity.max(MIN_OUTBOUND_BUFFER));
        let (kill_tx, kill) = oneshot::channel();
        let connection = Self {
            id: Uuid::new_v4(),
            room_id: None,
            last_seen: Instant::now(),
            outbound,
            kill: Some(kill_tx),
        };
        (connection, ConnectionIo { frames, kill })
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Queues a frame without waiting.
    pub fn try_send(&self, frame: Vec<u8>) -> Result<(), SendError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Tells the writer to send a close frame with `code` and stop.
    pub fn close(&mut self, code: u16) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(code);
        }
    }
}

/// Caps how many inbound frames of one connection may wait for the hub.
///
/// The reader takes a permit before handing a frame over and the hub drops
/// it once the frame is processed, so a connection that writes faster than
/// the hub keeps up stops being read and TCP pushes back on the client.
#[derive(Debug, Clone)]
pub struct InboundQuota {
    permits: Arc<Semaphore>,
}

impl InboundQuota {
    pub fn new(frames: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(frames.max(1))),
        }
    }

    /// Waits for room in the quota. `None` once the quota is closed.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.permits.clone().acquire_owned().await.ok()
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
