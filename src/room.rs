//! Room state machine, implemented as a per-room single-writer actor:
//! inbound commands are drained serially by one task, so room state needs
//! no lock at all. This works because the room task never blocks on a
//! peer's socket — sends go through each session's own bounded queue, per
//! `session.rs`.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};

use crate::ids::{ParticipantId, Protocol, RoomId, Role, WorkspaceId};
use crate::message::{
    now_iso8601, Message, RecoveryConfig, RoomInfo, RoomState, VideoConfig,
};
use crate::router::{self, Audience, RouteOutcome};
use crate::session::SessionHandle;
use crate::signaling::SignalRequest;
use crate::FabricError;

/// Bound on the actor's own inbound command queue. Distinct from a session's
/// outbound queue; this one only ever holds brief control commands, never
/// media-sized payloads, so a small bound is ample.
const COMMAND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct RoomMeta {
    pub workspace_id: WorkspaceId,
    pub room_id: RoomId,
    pub protocol: Protocol,
    pub created_at: String,
}

enum Command {
    Admit {
        session: SessionHandle,
        respond: oneshot::Sender<Result<(), FabricError>>,
    },
    Evict {
        participant_id: ParticipantId,
    },
    Apply {
        sender_id: ParticipantId,
        message: Message,
    },
    Signal {
        sender_id: ParticipantId,
        request: SignalRequest,
        respond: oneshot::Sender<Result<(), FabricError>>,
    },
    Info {
        respond: oneshot::Sender<RoomInfo>,
    },
    State {
        respond: oneshot::Sender<RoomState>,
    },
    /// Close every session and stop the actor.
    Shutdown,
}

/// A cheap, cloneable reference to a running room actor.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    pub meta: std::sync::Arc<RoomMeta>,
    tx: mpsc::Sender<Command>,
}

impl RoomHandle {
    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.meta.workspace_id
    }
    pub fn room_id(&self) -> &RoomId {
        &self.meta.room_id
    }
    pub fn protocol(&self) -> Protocol {
        self.meta.protocol
    }

    /// Place a session per its role, ack it, and fan out any lifecycle
    /// announcement or state-sync catch-up the room owes it.
    pub async fn admit(&self, session: SessionHandle) -> Result<(), FabricError> {
        let (respond, recv) = oneshot::channel();
        self.send(Command::Admit { session, respond }).await?;
        recv.await
            .map_err(|_| FabricError::Internal("room actor gone".into()))?
    }

    /// Best-effort: a room that has already shut down has nothing left to
    /// evict from.
    pub async fn evict(&self, participant_id: ParticipantId) {
        let _ = self.tx.send(Command::Evict { participant_id }).await;
    }

    /// Routing and dispatch happen inside the actor; this call is
    /// fire-and-forget from the caller's point of view (the actor enqueues
    /// any reply directly onto the sender's own outbound queue).
    pub async fn apply(&self, sender_id: ParticipantId, message: Message) {
        let _ = self.tx.send(Command::Apply { sender_id, message }).await;
    }

    /// WebRTC signaling broker entry point.
    pub async fn signal(
        &self,
        sender_id: ParticipantId,
        request: SignalRequest,
    ) -> Result<(), FabricError> {
        let (respond, recv) = oneshot::channel();
        self.send(Command::Signal {
            sender_id,
            request,
            respond,
        })
        .await?;
        recv.await
            .map_err(|_| FabricError::Internal("room actor gone".into()))?
    }

    pub async fn info(&self) -> RoomInfo {
        let (respond, recv) = oneshot::channel();
        if self.tx.send(Command::Info { respond }).await.is_err() {
            return self.fallback_info();
        }
        recv.await.unwrap_or_else(|_| self.fallback_info())
    }

    pub async fn state(&self) -> RoomState {
        let (respond, recv) = oneshot::channel();
        if self.tx.send(Command::State { respond }).await.is_err() {
            return RoomState {
                info: self.fallback_info(),
                joints: None,
                video_config: None,
                recovery_config: None,
                frame_count: None,
            };
        }
        recv.await.unwrap_or(RoomState {
            info: self.fallback_info(),
            joints: None,
            video_config: None,
            recovery_config: None,
            frame_count: None,
        })
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }

    fn fallback_info(&self) -> RoomInfo {
        RoomInfo {
            workspace_id: self.meta.workspace_id.clone(),
            room_id: self.meta.room_id.clone(),
            protocol: self.meta.protocol,
            producer: None,
            consumer_count: 0,
            created_at: self.meta.created_at.clone(),
        }
    }

    async fn send(&self, command: Command) -> Result<(), FabricError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| FabricError::Internal("room actor gone".into()))
    }
}

struct State {
    producer: Option<SessionHandle>,
    consumers: HashMap<ParticipantId, SessionHandle>,
    joints: HashMap<String, f64>,
    video_config: VideoConfig,
    recovery_config: RecoveryConfig,
    frame_count: u64,
    last_update_at: Option<String>,
}

impl State {
    fn new(video_config: VideoConfig, recovery_config: RecoveryConfig) -> Self {
        Self {
            producer: None,
            consumers: HashMap::new(),
            joints: HashMap::new(),
            video_config,
            recovery_config,
            frame_count: 0,
            last_update_at: None,
        }
    }

    fn find(&self, id: &ParticipantId) -> Option<SessionHandle> {
        if let Some(producer) = &self.producer {
            if producer.id() == id {
                return Some(producer.clone());
            }
        }
        self.consumers.get(id).cloned()
    }

    fn all_except(&self, sender_id: &ParticipantId) -> Vec<SessionHandle> {
        let mut out: Vec<SessionHandle> = self
            .consumers
            .values()
            .filter(|s| s.id() != sender_id)
            .cloned()
            .collect();
        if let Some(producer) = &self.producer {
            if producer.id() != sender_id {
                out.push(producer.clone());
            }
        }
        out
    }

    fn consumers_vec(&self) -> Vec<SessionHandle> {
        self.consumers.values().cloned().collect()
    }
}

pub fn spawn(
    meta: RoomMeta,
    video_config: VideoConfig,
    recovery_config: RecoveryConfig,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let meta = std::sync::Arc::new(meta);
    let protocol = meta.protocol;
    tokio::spawn(run(meta.clone(), protocol, rx, video_config, recovery_config));
    RoomHandle { meta, tx }
}

async fn run(
    meta: std::sync::Arc<RoomMeta>,
    protocol: Protocol,
    mut rx: mpsc::Receiver<Command>,
    video_config: VideoConfig,
    recovery_config: RecoveryConfig,
) {
    let mut state = State::new(video_config, recovery_config);
    log::debug!("room {}/{} actor started", meta.workspace_id, meta.room_id);
    while let Some(command) = rx.recv().await {
        match command {
            Command::Admit { session, respond } => {
                let result = admit(&mut state, protocol, &session);
                let _ = respond.send(result);
            }
            Command::Evict { participant_id } => evict(&mut state, protocol, &participant_id),
            Command::Apply { sender_id, message } => apply(&mut state, protocol, &sender_id, message),
            Command::Signal {
                sender_id,
                request,
                respond,
            } => {
                let result = crate::signaling::relay(&state_lookup(&state), &sender_id, request);
                let _ = respond.send(result);
            }
            Command::Info { respond } => {
                let _ = respond.send(room_info(&meta, &state));
            }
            Command::State { respond } => {
                let _ = respond.send(room_state(&meta, protocol, &state));
            }
            Command::Shutdown => {
                for session in state.consumers_vec() {
                    session.close();
                }
                if let Some(producer) = state.producer.take() {
                    producer.close();
                }
                break;
            }
        }
    }
    log::debug!("room {}/{} actor stopped", meta.workspace_id, meta.room_id);
}

/// Adapter so `signaling::relay` (a free function operating on a lookup
/// closure) doesn't need to know about `State`'s internal shape.
fn state_lookup(state: &State) -> impl Fn(&ParticipantId) -> Option<SessionHandle> + '_ {
    move |id| state.find(id)
}

fn admit(state: &mut State, protocol: Protocol, session: &SessionHandle) -> Result<(), FabricError> {
    match session.role() {
        Role::Producer => {
            if state.producer.is_some() {
                return Err(FabricError::ProducerExists(session.room_id().clone()));
            }
            state.producer = Some(session.clone());
        }
        Role::Consumer => {
            state.consumers.insert(session.id().clone(), session.clone());
        }
    }

    if protocol == Protocol::Video {
        let announcement = Message::ParticipantJoined {
            participant_id: session.id().clone(),
            role: session.role(),
        };
        for other in state.all_except(session.id()) {
            other.send(announcement.clone());
        }
    }

    session.send(Message::Joined {
        room_id: session.room_id().clone(),
        role: session.role(),
    });

    if protocol == Protocol::Robotics && session.role() == Role::Consumer && !state.joints.is_empty() {
        session.send(Message::StateSync {
            data: state.joints.clone(),
            timestamp: now_iso8601(),
        });
    }

    Ok(())
}

fn evict(state: &mut State, protocol: Protocol, participant_id: &ParticipantId) {
    let removed_role = if state
        .producer
        .as_ref()
        .map(|p| p.id() == participant_id)
        .unwrap_or(false)
    {
        state.producer = None;
        Some(Role::Producer)
    } else if state.consumers.remove(participant_id).is_some() {
        Some(Role::Consumer)
    } else {
        None
    };

    let Some(role) = removed_role else { return };

    if protocol == Protocol::Video {
        let announcement = Message::ParticipantLeft {
            participant_id: participant_id.clone(),
            role,
        };
        for other in state.all_except(participant_id) {
            other.send(announcement.clone());
        }
    }
    // Robotics rooms never clear `joints` on producer departure.
}

fn apply(state: &mut State, protocol: Protocol, sender_id: &ParticipantId, message: Message) {
    let Some(sender) = state.find(sender_id) else {
        return;
    };
    let sender_role = sender.role();

    let outcome = match protocol {
        Protocol::Robotics => router::robotics_route(&message, sender_role),
        Protocol::Video => router::video_route(&message, sender_role),
    };

    match outcome {
        RouteOutcome::NoOp => {}
        RouteOutcome::Unsupported => {
            sender.send(Message::error("unsupported for role"));
        }
        RouteOutcome::Broadcast(audience) => {
            let outbound = mutate_and_render(state, protocol, &message);
            dispatch(state, audience, sender_id, outbound);
        }
    }
}

/// Apply the state mutation implied by `message` (if any) and produce the
/// message that should actually go out on the wire — for `state_sync` that's
/// a converted `joint_update`.
fn mutate_and_render(state: &mut State, protocol: Protocol, message: &Message) -> Message {
    match (protocol, message) {
        (Protocol::Robotics, Message::JointUpdate { data, timestamp }) => {
            router::merge_joint_entries(&mut state.joints, data);
            state.last_update_at = Some(timestamp.clone());
            message.clone()
        }
        (Protocol::Robotics, Message::StateSync { data, timestamp }) => {
            router::merge_state_sync(&mut state.joints, data);
            state.last_update_at = Some(timestamp.clone());
            Message::JointUpdate {
                data: router::joints_to_entries(data),
                timestamp: timestamp.clone(),
            }
        }
        (Protocol::Video, Message::VideoConfigUpdate { config }) => {
            state.video_config.merge(config);
            Message::VideoConfigUpdate {
                config: state.video_config.clone(),
            }
        }
        (Protocol::Video, Message::StreamStarted { .. }) => {
            state.frame_count = 0;
            message.clone()
        }
        _ => message.clone(),
    }
}

fn dispatch(state: &State, audience: Audience, sender_id: &ParticipantId, message: Message) {
    let targets = match audience {
        Audience::Consumers => state.consumers_vec(),
        Audience::RoomExceptSender => state.all_except(sender_id),
    };
    for target in targets {
        if target.send(message.clone()) {
            let err = FabricError::Backpressure(target.id().clone());
            log::warn!("{err}");
            target.send(Message::error(err.reason()));
        }
    }
}

fn room_info(meta: &RoomMeta, state: &State) -> RoomInfo {
    RoomInfo {
        workspace_id: meta.workspace_id.clone(),
        room_id: meta.room_id.clone(),
        protocol: meta.protocol,
        producer: state.producer.as_ref().map(|p| p.id().clone()),
        consumer_count: state.consumers.len(),
        created_at: meta.created_at.clone(),
    }
}

fn room_state(meta: &RoomMeta, protocol: Protocol, state: &State) -> RoomState {
    let info = room_info(meta, state);
    match protocol {
        Protocol::Robotics => RoomState {
            info,
            joints: Some(state.joints.clone()),
            video_config: None,
            recovery_config: None,
            frame_count: None,
        },
        Protocol::Video => RoomState {
            info,
            joints: None,
            video_config: Some(state.video_config.clone()),
            recovery_config: Some(state.recovery_config.clone()),
            frame_count: Some(state.frame_count),
        },
    }
}
