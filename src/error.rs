//! Domain error taxonomy. Per-room errors never escape the room actor: the
//! actor converts them to a WS `error` frame or a log line. Registry-level
//! errors propagate to the REST layer via this type.

use thiserror::Error;

use crate::ids::{ParticipantId, RoomId, WorkspaceId};

#[derive(Debug, Clone, Error)]
pub enum FabricError {
    #[error("producer slot in room {0} is already occupied")]
    ProducerExists(RoomId),

    #[error("room {workspace_id}/{room_id} already exists")]
    RoomExists {
        workspace_id: WorkspaceId,
        room_id: RoomId,
    },

    #[error("room {workspace_id}/{room_id} does not exist")]
    UnknownRoom {
        workspace_id: WorkspaceId,
        room_id: RoomId,
    },

    #[error("unknown peer {0} in room")]
    UnknownPeer(ParticipantId),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("outbound queue full for {0}, dropped oldest message")]
    Backpressure(ParticipantId),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FabricError {
    /// Status code for the REST façade.
    pub fn status_code(&self) -> u16 {
        match self {
            FabricError::ProducerExists(_) | FabricError::RoomExists { .. } => 409,
            FabricError::UnknownRoom { .. } | FabricError::UnknownPeer(_) => 404,
            FabricError::ProtocolViolation(_) => 400,
            FabricError::Backpressure(_) | FabricError::Transport(_) | FabricError::Internal(_) => 500,
        }
    }

    /// Short machine-readable reason, used in WS `error` frames and REST bodies.
    pub fn reason(&self) -> &'static str {
        match self {
            FabricError::ProducerExists(_) => "producer_exists",
            FabricError::RoomExists { .. } => "room_exists",
            FabricError::UnknownRoom { .. } => "unknown_room",
            FabricError::UnknownPeer(_) => "unknown_peer",
            FabricError::ProtocolViolation(_) => "protocol_violation",
            FabricError::Backpressure(_) => "backpressure_drop",
            FabricError::Transport(_) => "transport_failure",
            FabricError::Internal(_) => "internal_error",
        }
    }
}

impl warp::reject::Reject for FabricError {}
