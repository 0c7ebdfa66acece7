//! REST façade. Built on `warp`: path filters returning `warp::reply::json`,
//! composed alongside the `warp::ws()` upgrade filter in `main.rs`.

use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use warp::{Filter, Rejection, Reply};

use crate::ids::{ParticipantId, Protocol, RoomId, WorkspaceId};
use crate::message::{RecoveryConfig, RoomInfo, RoomState, VideoConfig};
use crate::registry::{CreateRoomOptions, Registry};
use crate::signaling::SignalRequest;
use crate::FabricError;

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

fn ok<T: Serialize>(body: T) -> warp::reply::Json {
    warp::reply::json(&Envelope { success: true, body })
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

#[derive(Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub workspace_id: Option<WorkspaceId>,
    #[serde(default)]
    pub config: Option<VideoConfig>,
    #[serde(default)]
    pub recovery_config: Option<RecoveryConfig>,
}

#[derive(Serialize)]
struct RoomsList {
    workspace_id: WorkspaceId,
    rooms: Vec<RoomInfo>,
    total: usize,
}

#[derive(Serialize)]
struct RoomCreated {
    workspace_id: WorkspaceId,
    room_id: RoomId,
    message: String,
}

#[derive(Serialize)]
struct RoomInfoBody {
    workspace_id: WorkspaceId,
    room: RoomInfo,
}

#[derive(Serialize)]
struct RoomStateBody {
    workspace_id: WorkspaceId,
    state: RoomState,
}

#[derive(Serialize)]
struct RoomDeleted {
    workspace_id: WorkspaceId,
    message: String,
}

#[derive(Serialize)]
struct SignalResult {
    workspace_id: WorkspaceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: String,
}

fn protocol_param() -> impl Filter<Extract = (Protocol,), Error = Rejection> + Copy {
    warp::path::param::<String>().and_then(|segment: String| async move {
        match segment.as_str() {
            "robotics" => Ok(Protocol::Robotics),
            "video" => Ok(Protocol::Video),
            _ => Err(warp::reject::not_found()),
        }
    })
}

fn with_registry(
    registry: Registry,
) -> impl Filter<Extract = (Registry,), Error = Infallible> + Clone {
    warp::any().map(move || registry.clone())
}

/// The full REST surface plus `/health`. Rejections are left unconverted so
/// the caller can combine this with other filter trees before a single
/// top-level `.recover(handle_rejection)`.
pub fn routes(registry: Registry) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let base = warp::path!("health").map(|| {
        ok(Health {
            status: "healthy",
            version: format!(
                "{}_{}",
                crate::built_info::PKG_VERSION,
                crate::built_info::PROFILE
            ),
        })
    });

    let list = warp::get()
        .and(protocol_param())
        .and(warp::path!("workspaces" / String / "rooms"))
        .and(warp::path::end())
        .and(with_registry(registry.clone()))
        .and_then(list_rooms);

    let create = warp::post()
        .and(protocol_param())
        .and(warp::path!("workspaces" / String / "rooms"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with_registry(registry.clone()))
        .and_then(create_room);

    let info = warp::get()
        .and(protocol_param())
        .and(warp::path!("workspaces" / String / "rooms" / String))
        .and(warp::path::end())
        .and(with_registry(registry.clone()))
        .and_then(get_room_info);

    let state = warp::get()
        .and(protocol_param())
        .and(warp::path!("workspaces" / String / "rooms" / String / "state"))
        .and(with_registry(registry.clone()))
        .and_then(get_room_state);

    let delete = warp::delete()
        .and(protocol_param())
        .and(warp::path!("workspaces" / String / "rooms" / String))
        .and(warp::path::end())
        .and(with_registry(registry.clone()))
        .and_then(delete_room);

    let signal = warp::post()
        .and(warp::path("video"))
        .and(warp::path!("workspaces" / String / "rooms" / String / "webrtc" / "signal"))
        .and(warp::body::json())
        .and(with_registry(registry))
        .and_then(webrtc_signal);

    base.or(list)
        .unify()
        .or(create)
        .unify()
        .or(info)
        .unify()
        .or(state)
        .unify()
        .or(delete)
        .unify()
        .or(signal)
        .unify()
        .boxed()
}

async fn list_rooms(
    _protocol: Protocol,
    workspace_id: String,
    registry: Registry,
) -> Result<warp::reply::Json, Rejection> {
    let workspace_id = WorkspaceId::from(workspace_id);
    let rooms = registry.list_room_info(&workspace_id).await;
    let total = rooms.len();
    Ok(ok(RoomsList {
        workspace_id,
        rooms,
        total,
    }))
}

async fn create_room(
    protocol: Protocol,
    workspace_id: String,
    request: CreateRoomRequest,
    registry: Registry,
) -> Result<warp::reply::Json, Rejection> {
    let workspace_id = request
        .workspace_id
        .unwrap_or_else(|| WorkspaceId::from(workspace_id));
    let handle = registry
        .create_room(
            workspace_id.clone(),
            protocol,
            CreateRoomOptions {
                room_id: request.room_id,
                video_config: request.config.unwrap_or_default(),
                recovery_config: request.recovery_config.unwrap_or_default(),
            },
        )
        .map_err(warp::reject::custom)?;
    Ok(ok(RoomCreated {
        workspace_id,
        room_id: handle.room_id().clone(),
        message: "room created".into(),
    }))
}

async fn get_room_info(
    _protocol: Protocol,
    workspace_id: String,
    room_id: String,
    registry: Registry,
) -> Result<warp::reply::Json, Rejection> {
    let workspace_id = WorkspaceId::from(workspace_id);
    let room = registry
        .get_room_info(&workspace_id, &RoomId::from(room_id))
        .await
        .map_err(warp::reject::custom)?;
    Ok(ok(RoomInfoBody { workspace_id, room }))
}

async fn get_room_state(
    _protocol: Protocol,
    workspace_id: String,
    room_id: String,
    registry: Registry,
) -> Result<warp::reply::Json, Rejection> {
    let workspace_id = WorkspaceId::from(workspace_id);
    let state = registry
        .get_room_state(&workspace_id, &RoomId::from(room_id))
        .await
        .map_err(warp::reject::custom)?;
    Ok(ok(RoomStateBody { workspace_id, state }))
}

async fn delete_room(
    _protocol: Protocol,
    workspace_id: String,
    room_id: String,
    registry: Registry,
) -> Result<warp::reply::Json, Rejection> {
    let workspace_id = WorkspaceId::from(workspace_id);
    let room_id = RoomId::from(room_id);
    let existed = registry.delete_room(&workspace_id, &room_id);
    let message = match existed {
        Some(handle) => {
            handle.shutdown().await;
            "room deleted".to_string()
        }
        None => "room did not exist".to_string(),
    };
    Ok(ok(RoomDeleted { workspace_id, message }))
}

async fn webrtc_signal(
    workspace_id: String,
    room_id: String,
    request: SignalRequest,
    registry: Registry,
) -> Result<warp::reply::Json, Rejection> {
    let workspace_id = WorkspaceId::from(workspace_id);
    let room_id = RoomId::from(room_id);
    let handle = registry
        .get_room(&workspace_id, &room_id)
        .ok_or_else(|| {
            warp::reject::custom(FabricError::UnknownRoom {
                workspace_id: workspace_id.clone(),
                room_id: room_id.clone(),
            })
        })?;
    let client_id: ParticipantId = request.client_id.clone();
    match handle.signal(client_id, request).await {
        Ok(()) => Ok(ok(SignalResult {
            workspace_id,
            response: None,
            message: None,
        })),
        Err(err @ FabricError::UnknownPeer(_)) => Ok(ok(SignalResult {
            workspace_id,
            response: None,
            message: Some(err.to_string()),
        })),
        Err(err) => Err(warp::reject::custom(err)),
    }
}

/// Converts any `FabricError` (or other) rejection into a JSON error body.
/// Call once, after combining every filter tree the server serves.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(fabric_err) = err.find::<FabricError>() {
        (fabric_err.status_code(), fabric_err.to_string())
    } else if err.is_not_found() {
        (404, "not found".to_string())
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (400, "malformed request body".to_string())
    } else {
        (500, "internal error".to_string())
    };
    let reply = warp::reply::json(&ErrorBody {
        success: false,
        error: message,
    });
    Ok(warp::reply::with_status(
        reply,
        warp::http::StatusCode::from_u16(status).unwrap(),
    ))
}
