//! Connection Gateway: live connections and explicit room membership.
//!
//! Rooms are an explicit table from session id to the set of member
//! connection ids. A room appears on its first join and is removed as soon
//! as its set empties. Every single-room mutation happens inside one write
//! lock, and each connection mirrors its own memberships (with the peer id
//! it joined under) so disconnect can walk them without scanning the table.
//!
//! Lock order: room table, then the connection map, then a connection's
//! membership map. Unregistering holds the room table lock, so a join can
//! never land in a room after its connection is gone.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use jamroom_core::{ConnectionId, PeerId, SessionId};

/// Failure to hand a frame to a connection's writer. Never surfaced to the
/// sender of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("send queue full")]
    QueueFull,
    #[error("connection closed")]
    Closed,
    #[error("unknown connection")]
    UnknownConnection,
}

/// One live WebSocket link.
pub struct Connection {
    pub id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    rooms: Mutex<HashMap<SessionId, PeerId>>,
    last_pong: Mutex<Instant>,
    dropped_frames: AtomicU64,
}

impl Connection {
    fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            rooms: Mutex::new(HashMap::new()),
            last_pong: Mutex::new(Instant::now()),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Enqueue a frame for the writer task without waiting.
    pub fn send(&self, frame: Arc<String>) -> Result<(), TransportError> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                match err {
                    mpsc::error::TrySendError::Full(_) => Err(TransportError::QueueFull),
                    mpsc::error::TrySendError::Closed(_) => Err(TransportError::Closed),
                }
            }
        }
    }

    /// Rooms this connection belongs to, with the peer id it joined under.
    pub fn rooms(&self) -> Vec<(SessionId, PeerId)> {
        self.rooms
            .lock()
            .iter()
            .map(|(room, peer)| (room.clone(), peer.clone()))
            .collect()
    }

    pub fn record_pong(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

/// Registry of live connections and the rooms they occupy.
pub struct ConnectionGateway {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    rooms: RwLock<HashMap<SessionId, HashSet<ConnectionId>>>,
    max_send_queue: usize,
}

impl ConnectionGateway {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: RwLock::new(HashMap::new()),
            max_send_queue,
        }
    }

    /// Register a new connection and return it with its outbound queue.
    pub fn register(&self) -> (Arc<Connection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let connection = Arc::new(Connection::new(ConnectionId::new(), tx));
        let _ = self
            .connections
            .insert(connection.id.clone(), Arc::clone(&connection));
        (connection, rx)
    }

    /// Remove a connection, purging any memberships it still holds.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let mut rooms = self.rooms.write();
        let (_, connection) = self.connections.remove(id)?;
        let leftover: Vec<SessionId> = connection.rooms.lock().keys().cloned().collect();
        for room in leftover {
            let _ = detach(&mut rooms, &connection, &room);
        }
        Some(connection)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Add a connection to a room. Returns `true` if it was not already a
    /// member. Re-joining only refreshes the recorded peer id.
    ///
    /// Fails with [`TransportError::UnknownConnection`] once the connection
    /// has been unregistered; the room is left untouched.
    pub fn add_to_room(
        &self,
        connection: &Connection,
        room: SessionId,
        peer: PeerId,
    ) -> Result<bool, TransportError> {
        let mut rooms = self.rooms.write();
        if !self.connections.contains_key(&connection.id) {
            return Err(TransportError::UnknownConnection);
        }
        let inserted = rooms
            .entry(room.clone())
            .or_default()
            .insert(connection.id.clone());
        let _ = connection.rooms.lock().insert(room, peer);
        Ok(inserted)
    }

    /// Remove a connection from a room, dropping the room once empty.
    /// Returns the peer id the connection had joined under.
    pub fn remove_from_room(&self, connection: &Connection, room: &SessionId) -> Option<PeerId> {
        detach(&mut self.rooms.write(), connection, room)
    }

    /// Current members of a room (empty if the room does not exist).
    pub fn room_members(&self, room: &SessionId) -> Vec<ConnectionId> {
        self.rooms
            .read()
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms a connection belongs to (empty for unknown connections).
    pub fn rooms_of(&self, id: &ConnectionId) -> Vec<SessionId> {
        self.get(id)
            .map(|connection| connection.rooms().into_iter().map(|(room, _)| room).collect())
            .unwrap_or_default()
    }

    /// Send one frame to one connection.
    pub fn send(&self, id: &ConnectionId, frame: Arc<String>) -> Result<(), TransportError> {
        match self.get(id) {
            Some(connection) => connection.send(frame),
            None => Err(TransportError::UnknownConnection),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }
}

fn detach(
    rooms: &mut HashMap<SessionId, HashSet<ConnectionId>>,
    connection: &Connection,
    room: &SessionId,
) -> Option<PeerId> {
    if let Some(members) = rooms.get_mut(room) {
        let _ = members.remove(&connection.id);
        if members.is_empty() {
            let _ = rooms.remove(room);
        }
    }
    connection.rooms.lock().remove(room)
}
