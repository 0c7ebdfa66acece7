//! Wire message types. One tagged union on `type`, decoded through serde —
//! unknown tags fail to deserialize and are routed to the uniform
//! protocol-violation handler in `ws.rs`.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ParticipantId, RoomId, Role};

pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

/// The first frame a client must send. Carries no `type` tag — it's a
/// fixed-shape handshake, not a routed message.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JoinRequest {
    pub participant_id: ParticipantId,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JointEntry {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VideoConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framerate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl VideoConfig {
    /// Merge non-null fields of `patch` into `self`, leaving the rest unchanged.
    pub fn merge(&mut self, patch: &VideoConfig) {
        if patch.resolution.is_some() {
            self.resolution = patch.resolution.clone();
        }
        if patch.framerate.is_some() {
            self.framerate = patch.framerate;
        }
        if patch.bitrate.is_some() {
            self.bitrate = patch.bitrate;
        }
        if patch.encoding.is_some() {
            self.encoding = patch.encoding.clone();
        }
    }
}

/// Policy + parameters for consumer-side frame-loss handling. The fabric
/// only stores and forwards this; it never acts on it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecoveryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    // --- robotics ---
    JointUpdate {
        data: Vec<JointEntry>,
        #[serde(default = "now_iso8601")]
        timestamp: String,
    },
    StateSync {
        data: HashMap<String, f64>,
        #[serde(default = "now_iso8601")]
        timestamp: String,
    },
    Heartbeat {
        #[serde(default = "now_iso8601")]
        timestamp: String,
    },
    HeartbeatAck {
        #[serde(default = "now_iso8601")]
        timestamp: String,
    },
    EmergencyStop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default = "now_iso8601")]
        timestamp: String,
    },
    Joined {
        room_id: RoomId,
        role: Role,
    },
    Error {
        message: String,
    },

    // --- video ---
    StreamStarted {
        #[serde(default = "now_iso8601")]
        timestamp: String,
    },
    StreamStopped {
        #[serde(default = "now_iso8601")]
        timestamp: String,
    },
    VideoConfigUpdate {
        config: VideoConfig,
    },
    RecoveryTriggered {
        #[serde(default, skip_serializing_if = "Value::is_null")]
        detail: Value,
    },
    ParticipantJoined {
        participant_id: ParticipantId,
        role: Role,
    },
    ParticipantLeft {
        participant_id: ParticipantId,
        role: Role,
    },
    WebrtcOffer {
        from_producer: ParticipantId,
        offer: Value,
    },
    WebrtcAnswer {
        from_consumer: ParticipantId,
        answer: Value,
    },
    WebrtcIce {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_producer: Option<ParticipantId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_consumer: Option<ParticipantId>,
        ice: Value,
    },
    StatusUpdate {
        #[serde(default, skip_serializing_if = "Value::is_null")]
        status: Value,
    },
    StreamStats {
        #[serde(default, skip_serializing_if = "Value::is_null")]
        stats: Value,
    },
}

impl Message {
    pub fn error(reason: impl Into<String>) -> Self {
        Message::Error {
            message: reason.into(),
        }
    }

    /// The `type` tag, for logging without re-serializing the payload.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Message::JointUpdate { .. } => "joint_update",
            Message::StateSync { .. } => "state_sync",
            Message::Heartbeat { .. } => "heartbeat",
            Message::HeartbeatAck { .. } => "heartbeat_ack",
            Message::EmergencyStop { .. } => "emergency_stop",
            Message::Joined { .. } => "joined",
            Message::Error { .. } => "error",
            Message::StreamStarted { .. } => "stream_started",
            Message::StreamStopped { .. } => "stream_stopped",
            Message::VideoConfigUpdate { .. } => "video_config_update",
            Message::RecoveryTriggered { .. } => "recovery_triggered",
            Message::ParticipantJoined { .. } => "participant_joined",
            Message::ParticipantLeft { .. } => "participant_left",
            Message::WebrtcOffer { .. } => "webrtc_offer",
            Message::WebrtcAnswer { .. } => "webrtc_answer",
            Message::WebrtcIce { .. } => "webrtc_ice",
            Message::StatusUpdate { .. } => "status_update",
            Message::StreamStats { .. } => "stream_stats",
        }
    }
}

/// Shallow room listing entry, as returned by `list_rooms` and `get_room_info`.
#[derive(Debug, Clone, Serialize)]
pub struct RoomInfo {
    pub workspace_id: crate::ids::WorkspaceId,
    pub room_id: RoomId,
    pub protocol: crate::ids::Protocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<ParticipantId>,
    pub consumer_count: usize,
    pub created_at: String,
}

/// Authoritative snapshot, as returned by `get_room_state`.
#[derive(Debug, Clone, Serialize)]
pub struct RoomState {
    #[serde(flatten)]
    pub info: RoomInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joints: Option<HashMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_config: Option<VideoConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_config: Option<RecoveryConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u64>,
}
