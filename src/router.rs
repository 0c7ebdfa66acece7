//! Message -> dispatch policy tables. Kept as pure functions so the policy
//! itself is unit-testable without spinning up the room actor in `room.rs`.
//! Heartbeats are answered synchronously a layer up, directly by the
//! session loop, without touching room state, so they never reach these
//! tables.

use std::collections::HashMap;

use crate::ids::Role;
use crate::message::{JointEntry, Message};

/// Who receives the outbound message the router produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// All consumers currently in the room. The producer never receives its
    /// own traffic echoed back.
    Consumers,
    /// Every other participant in the room, producer or consumer, excluding
    /// the sender.
    RoomExceptSender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Applied and should be broadcast to `Audience`.
    Broadcast(Audience),
    /// Applied (or a legal no-op) but nothing should be sent — an empty
    /// `joint_update` list is a no-op; it is not broadcast.
    NoOp,
    /// Wrong sender role, or a message type this protocol/room doesn't
    /// accept. The caller replies `error` to the sender only.
    Unsupported,
}

/// Merge each `{name, value}` into `joints`, last-write-wins.
pub fn merge_joint_entries(joints: &mut HashMap<String, f64>, entries: &[JointEntry]) {
    for entry in entries {
        joints.insert(entry.name.clone(), entry.value);
    }
}

/// Merge a `state_sync` map into `joints`. Keys absent from `patch` are left
/// untouched — `state_sync` merges, it never replaces the joint set wholesale.
pub fn merge_state_sync(joints: &mut HashMap<String, f64>, patch: &HashMap<String, f64>) {
    for (name, value) in patch {
        joints.insert(name.clone(), *value);
    }
}

pub fn joints_to_entries(joints: &HashMap<String, f64>) -> Vec<JointEntry> {
    let mut entries: Vec<JointEntry> = joints
        .iter()
        .map(|(name, value)| JointEntry {
            name: name.clone(),
            value: *value,
            speed: None,
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

/// Robotics router policy.
pub fn robotics_route(message: &Message, sender_role: Role) -> RouteOutcome {
    match message {
        Message::JointUpdate { data, .. } => {
            if sender_role != Role::Producer {
                RouteOutcome::Unsupported
            } else if data.is_empty() {
                RouteOutcome::NoOp
            } else {
                RouteOutcome::Broadcast(Audience::Consumers)
            }
        }
        Message::StateSync { .. } => {
            if sender_role != Role::Producer {
                RouteOutcome::Unsupported
            } else {
                RouteOutcome::Broadcast(Audience::Consumers)
            }
        }
        Message::EmergencyStop { .. } => RouteOutcome::Broadcast(Audience::RoomExceptSender),
        _ => RouteOutcome::Unsupported,
    }
}

/// Video router policy. `recovery_triggered` is a consumer-only self-report;
/// `stream_started`/`stream_stopped`/`video_config_update` are producer-only.
pub fn video_route(message: &Message, sender_role: Role) -> RouteOutcome {
    match message {
        Message::StreamStarted { .. }
        | Message::StreamStopped { .. }
        | Message::VideoConfigUpdate { .. } => {
            if sender_role == Role::Producer {
                RouteOutcome::Broadcast(Audience::Consumers)
            } else {
                RouteOutcome::Unsupported
            }
        }
        Message::RecoveryTriggered { .. } => {
            if sender_role == Role::Consumer {
                RouteOutcome::Broadcast(Audience::RoomExceptSender)
            } else {
                RouteOutcome::Unsupported
            }
        }
        Message::EmergencyStop { .. }
        | Message::StatusUpdate { .. }
        | Message::StreamStats { .. } => RouteOutcome::Broadcast(Audience::RoomExceptSender),
        _ => RouteOutcome::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> String {
        crate::message::now_iso8601()
    }

    #[test]
    fn empty_joint_update_is_noop() {
        let msg = Message::JointUpdate {
            data: vec![],
            timestamp: ts(),
        };
        assert_eq!(robotics_route(&msg, Role::Producer), RouteOutcome::NoOp);
    }

    #[test]
    fn nonempty_joint_update_from_producer_broadcasts_to_consumers() {
        let msg = Message::JointUpdate {
            data: vec![JointEntry {
                name: "shoulder".into(),
                value: 45.0,
                speed: None,
            }],
            timestamp: ts(),
        };
        assert_eq!(
            robotics_route(&msg, Role::Producer),
            RouteOutcome::Broadcast(Audience::Consumers)
        );
    }

    #[test]
    fn joint_update_from_consumer_is_unsupported() {
        let msg = Message::JointUpdate {
            data: vec![JointEntry {
                name: "shoulder".into(),
                value: 1.0,
                speed: None,
            }],
            timestamp: ts(),
        };
        assert_eq!(robotics_route(&msg, Role::Consumer), RouteOutcome::Unsupported);
    }

    #[test]
    fn emergency_stop_excludes_only_sender_in_either_protocol() {
        let msg = Message::EmergencyStop {
            reason: Some("test".into()),
            timestamp: ts(),
        };
        assert_eq!(
            robotics_route(&msg, Role::Producer),
            RouteOutcome::Broadcast(Audience::RoomExceptSender)
        );
        assert_eq!(
            video_route(&msg, Role::Consumer),
            RouteOutcome::Broadcast(Audience::RoomExceptSender)
        );
    }

    #[test]
    fn state_sync_merges_without_clearing_absent_keys() {
        let mut joints = HashMap::new();
        merge_state_sync(
            &mut joints,
            &HashMap::from([("a".to_string(), 1.0), ("b".to_string(), 2.0)]),
        );
        merge_state_sync(&mut joints, &HashMap::from([("b".to_string(), 3.0)]));
        assert_eq!(joints.get("a"), Some(&1.0));
        assert_eq!(joints.get("b"), Some(&3.0));
    }

    #[test]
    fn state_sync_applied_twice_is_idempotent() {
        let mut joints = HashMap::new();
        let patch = HashMap::from([("a".to_string(), 1.0)]);
        merge_state_sync(&mut joints, &patch);
        let first = joints.clone();
        merge_state_sync(&mut joints, &patch);
        assert_eq!(joints, first);
    }

    #[test]
    fn recovery_triggered_requires_consumer_sender() {
        let msg = Message::RecoveryTriggered {
            detail: serde_json::Value::Null,
        };
        assert_eq!(
            video_route(&msg, Role::Consumer),
            RouteOutcome::Broadcast(Audience::RoomExceptSender)
        );
        assert_eq!(video_route(&msg, Role::Producer), RouteOutcome::Unsupported);
    }

    #[test]
    fn stream_started_requires_producer_sender() {
        let msg = Message::StreamStarted { timestamp: ts() };
        assert_eq!(
            video_route(&msg, Role::Producer),
            RouteOutcome::Broadcast(Audience::Consumers)
        );
        assert_eq!(video_route(&msg, Role::Consumer), RouteOutcome::Unsupported);
    }
}
