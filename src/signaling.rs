//! WebRTC signaling broker. Stateless relay of offer/answer/ICE between a
//! named producer and a named consumer within a room. The broker never
//! inspects or rewrites the SDP/candidate payload — it only checks who's
//! allowed to address whom and re-tags the envelope with the sender's
//! identity before handing it to the target's outbound queue.

use serde::Deserialize;
use serde_json::Value;

use crate::ids::{ParticipantId, Role};
use crate::message::Message;
use crate::session::SessionHandle;
use crate::FabricError;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalKind {
    Offer {
        target_consumer: ParticipantId,
        #[serde(flatten)]
        payload: Value,
    },
    Answer {
        target_producer: ParticipantId,
        #[serde(flatten)]
        payload: Value,
    },
    Ice {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_consumer: Option<ParticipantId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_producer: Option<ParticipantId>,
        #[serde(flatten)]
        payload: Value,
    },
}

/// Body of `POST .../webrtc/signal`.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalRequest {
    pub client_id: ParticipantId,
    pub message: SignalKind,
}

/// Validate sender role against targeting direction, look up the target
/// session, wrap the payload into the matching outbound `webrtc_*` type, and
/// enqueue it. A missing target is non-fatal to the room (`UnknownPeer`).
pub fn relay(
    lookup: &impl Fn(&ParticipantId) -> Option<SessionHandle>,
    sender_id: &ParticipantId,
    request: SignalRequest,
) -> Result<(), FabricError> {
    if &request.client_id != sender_id {
        return Err(FabricError::ProtocolViolation(
            "client_id does not match authenticated sender".into(),
        ));
    }
    let Some(sender) = lookup(sender_id) else {
        return Err(FabricError::UnknownPeer(sender_id.clone()));
    };

    let (target_id, outbound) = match &request.message {
        SignalKind::Offer {
            target_consumer,
            payload,
        } => {
            require_role(sender.role(), Role::Producer)?;
            (
                target_consumer.clone(),
                Message::WebrtcOffer {
                    from_producer: sender_id.clone(),
                    offer: payload.clone(),
                },
            )
        }
        SignalKind::Answer {
            target_producer,
            payload,
        } => {
            require_role(sender.role(), Role::Consumer)?;
            (
                target_producer.clone(),
                Message::WebrtcAnswer {
                    from_consumer: sender_id.clone(),
                    answer: payload.clone(),
                },
            )
        }
        SignalKind::Ice {
            target_consumer,
            target_producer,
            payload,
        } => match (target_consumer, target_producer) {
            (Some(target), None) => {
                require_role(sender.role(), Role::Producer)?;
                (
                    target.clone(),
                    Message::WebrtcIce {
                        from_producer: Some(sender_id.clone()),
                        from_consumer: None,
                        ice: payload.clone(),
                    },
                )
            }
            (None, Some(target)) => {
                require_role(sender.role(), Role::Consumer)?;
                (
                    target.clone(),
                    Message::WebrtcIce {
                        from_producer: None,
                        from_consumer: Some(sender_id.clone()),
                        ice: payload.clone(),
                    },
                )
            }
            _ => {
                return Err(FabricError::ProtocolViolation(
                    "ice candidate must name exactly one target".into(),
                ))
            }
        },
    };

    match lookup(&target_id) {
        Some(target) => {
            target.send(outbound);
            Ok(())
        }
        None => Err(FabricError::UnknownPeer(target_id)),
    }
}

fn require_role(actual: Role, expected: Role) -> Result<(), FabricError> {
    if actual == expected {
        Ok(())
    } else {
        Err(FabricError::ProtocolViolation(format!(
            "sender role {actual} cannot address a {expected}-targeted message"
        )))
    }
}
