//! Participant session. A session is one peer's bidirectional stream to the
//! fabric: an identity, a role, and a bounded outbound queue. Mirrors the
//! teacher's `Session`/`Shared` split in `session.rs` — state behind a
//! `Mutex`, cheap `Clone` via `Arc` — minus the mediasoup transport
//! bookkeeping this fabric has no use for.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::sync::Arc;

use tokio::sync::Notify;

use crate::ids::{ParticipantId, RoomId, Role, WorkspaceId};
use crate::message::{JoinRequest, Message};

/// Comfortably above a healthy consumer's steady-state lag, short of
/// holding onto minutes of stale robotics telemetry.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

struct QueueInner {
    queue: VecDeque<Message>,
    closed: bool,
}

/// Single-producer (room), single-consumer (writer task) bounded FIFO with
/// drop-oldest overflow. A dropped message surfaces to the caller so it can
/// emit the one-time `backpressure_drop` notice.
pub struct OutboundQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                queue: VecDeque::with_capacity(capacity.min(16)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueue a message. Returns `true` if an older message was evicted to
    /// make room — the caller should emit a single `backpressure_drop` error
    /// to this session when that happens.
    pub fn push(&self, message: Message) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return false;
        }
        let dropped = if inner.queue.len() >= self.capacity {
            inner.queue.pop_front();
            true
        } else {
            false
        };
        inner.queue.push_back(message);
        drop(inner);
        self.notify.notify_one();
        dropped
    }

    /// Wait for and remove the next message, or `None` once closed and drained.
    pub async fn recv(&self) -> Option<Message> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(message) = inner.queue.pop_front() {
                    return Some(message);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
    }
}

struct Shared {
    id: ParticipantId,
    role: Role,
    workspace_id: WorkspaceId,
    room_id: RoomId,
    outbound: OutboundQueue,
    active: AtomicBool,
}

/// A handle to one participant's session. Cheaply `Clone`able; every clone
/// shares the same outbound queue and close flag.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub fn new(id: ParticipantId, role: Role, workspace_id: WorkspaceId, room_id: RoomId) -> Self {
        Self {
            shared: Arc::new(Shared {
                id,
                role,
                workspace_id,
                room_id,
                outbound: OutboundQueue::new(DEFAULT_QUEUE_CAPACITY),
                active: AtomicBool::new(true),
            }),
        }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.shared.id
    }
    pub fn role(&self) -> Role {
        self.shared.role
    }
    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.shared.workspace_id
    }
    pub fn room_id(&self) -> &RoomId {
        &self.shared.room_id
    }

    /// Enqueue an outbound frame; FIFO, no merging. Returns `true` if this
    /// send caused an older message to be dropped.
    pub fn send(&self, message: Message) -> bool {
        self.shared.outbound.push(message)
    }

    pub async fn recv(&self) -> Option<Message> {
        self.shared.outbound.recv().await
    }

    /// Idempotent close.
    pub fn close(&self) {
        if self.shared.active.swap(false, Ordering::SeqCst) {
            self.shared.outbound.close();
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("role", &self.shared.role)
            .finish()
    }
}

/// The pre-join handshake state machine. Isolated from any actual socket so
/// the protocol-violation rules are unit-testable without async plumbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Opening,
    Closing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeOutcome {
    /// Valid `join`; caller should admit the session and reply `joined`.
    Joined { request: JoinRequest },
    /// Malformed first frame, or any frame received before `join` succeeds.
    /// Caller must reply with `error` and close.
    Reject { reason: String },
}

/// Evaluate the first text frame of a new connection. While opening, any
/// non-join inbound message triggers `error` and the connection closes.
pub fn handshake(raw: &str) -> HandshakeOutcome {
    match serde_json::from_str::<JoinRequest>(raw) {
        Ok(request) => HandshakeOutcome::Joined { request },
        Err(err) => HandshakeOutcome::Reject {
            reason: format!("expected join request: {err}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> SessionHandle {
        SessionHandle::new(
            ParticipantId::from("p1"),
            Role::Producer,
            WorkspaceId::from("w1"),
            RoomId::from("r1"),
        )
    }

    #[test]
    fn handshake_accepts_valid_join() {
        let outcome = handshake(r#"{"participant_id":"p1","role":"producer"}"#);
        assert!(matches!(outcome, HandshakeOutcome::Joined { .. }));
    }

    #[test]
    fn handshake_rejects_non_join_first_message() {
        let outcome = handshake(r#"{"type":"joint_update","data":[]}"#);
        assert!(matches!(outcome, HandshakeOutcome::Reject { .. }));
    }

    #[tokio::test]
    async fn send_then_recv_is_fifo() {
        let session = handle();
        session.send(Message::HeartbeatAck {
            timestamp: "1".into(),
        });
        session.send(Message::HeartbeatAck {
            timestamp: "2".into(),
        });
        let first = session.recv().await.unwrap();
        match first {
            Message::HeartbeatAck { timestamp } => assert_eq!(timestamp, "1"),
            _ => panic!("unexpected message"),
        }
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let queue = OutboundQueue::new(2);
        assert!(!queue.push(Message::HeartbeatAck { timestamp: "1".into() }));
        assert!(!queue.push(Message::HeartbeatAck { timestamp: "2".into() }));
        assert!(queue.push(Message::HeartbeatAck { timestamp: "3".into() }));
        let first = queue.recv().await.unwrap();
        match first {
            Message::HeartbeatAck { timestamp } => assert_eq!(timestamp, "2"),
            _ => panic!("unexpected message"),
        }
    }

    #[tokio::test]
    async fn close_wakes_pending_recv_with_none() {
        let session = handle();
        session.close();
        assert_eq!(session.recv().await, None);
    }
}
