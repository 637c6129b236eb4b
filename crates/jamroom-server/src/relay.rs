//! Signaling Relay: join/leave broadcasts on top of the gateway's rooms.
//!
//! Arrival is broadcast to the other members *before* the joiner is added,
//! so a joiner never hears its own announcement. The recipient snapshot and
//! the membership insert are separate critical sections: two connections
//! joining the same room at the same instant may each miss the other's
//! announcement. Delivery is fire-and-forget; failed sends are dropped.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use jamroom_core::protocol::OutboundEvent;
use jamroom_core::{ConnectionId, PeerId, SessionId};

use crate::gateway::{Connection, ConnectionGateway};

/// Payload of `viewer leaving`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeavePayload {
    /// No payload; receivers cannot tell who left.
    #[default]
    Legacy,
    /// Protocol extension: include the departing peer id.
    WithPeer,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub leave_payload: LeavePayload,
}

/// Why a connection went away. Informational only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientClosed,
    HeartbeatTimeout,
    TransportError(String),
    ServerShutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientClosed => write!(f, "client_closed"),
            Self::HeartbeatTimeout => write!(f, "heartbeat_timeout"),
            Self::TransportError(e) => write!(f, "transport_error: {e}"),
            Self::ServerShutdown => write!(f, "server_shutdown"),
        }
    }
}

pub struct SignalingRelay {
    gateway: Arc<ConnectionGateway>,
    config: RelayConfig,
}

impl SignalingRelay {
    pub fn new(gateway: Arc<ConnectionGateway>, config: RelayConfig) -> Self {
        Self { gateway, config }
    }

    pub fn gateway(&self) -> &Arc<ConnectionGateway> {
        &self.gateway
    }

    /// Announce `peer` to the room, then add the connection to it.
    ///
    /// The broadcast and the add are separate critical sections, so two
    /// connections joining an empty room at the same moment may both see it
    /// empty and neither is announced to the other.
    ///
    /// Returns how many members the announcement was handed to.
    pub fn join(&self, connection_id: &ConnectionId, room: SessionId, peer: PeerId) -> usize {
        let Some(connection) = self.gateway.get(connection_id) else {
            debug!(conn_id = %connection_id, session_id = %room, "join from unknown connection ignored");
            return 0;
        };

        let event = OutboundEvent::ViewerJoining {
            peer_id: peer.clone(),
        };
        let delivered = self.broadcast(&room, &connection, &event);

        let inserted = match self.gateway.add_to_room(&connection, room.clone(), peer) {
            Ok(inserted) => inserted,
            Err(error) => {
                debug!(
                    conn_id = %connection_id,
                    session_id = %room,
                    %error,
                    "connection went away mid-join"
                );
                return delivered;
            }
        };
        info!(
            conn_id = %connection_id,
            session_id = %room,
            recipients = delivered,
            rejoin = !inserted,
            "viewer joined room"
        );
        delivered
    }

    /// Announce departure to every room the connection is in, leave them,
    /// and drop the connection. Returns the number of rooms left.
    pub fn disconnect(&self, connection_id: &ConnectionId, reason: DisconnectReason) -> usize {
        let Some(connection) = self.gateway.get(connection_id) else {
            return 0;
        };

        let rooms = connection.rooms();
        for (room, peer) in &rooms {
            let event = OutboundEvent::ViewerLeaving {
                peer_id: match self.config.leave_payload {
                    LeavePayload::Legacy => None,
                    LeavePayload::WithPeer => Some(peer.clone()),
                },
            };
            let delivered = self.broadcast(room, &connection, &event);
            let _ = self.gateway.remove_from_room(&connection, room);
            debug!(
                conn_id = %connection_id,
                session_id = %room,
                recipients = delivered,
                "viewer left room"
            );
        }

        let _ = self.gateway.unregister(connection_id);
        info!(
            conn_id = %connection_id,
            rooms = rooms.len(),
            dropped_frames = connection.drop_count(),
            reason = %reason,
            "connection disconnected"
        );
        rooms.len()
    }

    /// Send `event` to every member of `room` except `sender`. Send failures
    /// are swallowed.
    fn broadcast(&self, room: &SessionId, sender: &Connection, event: &OutboundEvent) -> usize {
        let frame = Arc::new(event.to_frame());
        let mut delivered = 0;
        for member in self.gateway.room_members(room) {
            if member == sender.id {
                continue;
            }
            match self.gateway.send(&member, Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(error) => {
                    debug!(
                        conn_id = %member,
                        session_id = %room,
                        event = event.name(),
                        %error,
                        "dropped signaling frame"
                    );
                }
            }
        }
        delivered
    }
}
