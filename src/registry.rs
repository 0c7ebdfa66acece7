//! Workspace & room registry — the gate for every entry point. Two-level
//! map `{workspace -> rooms}`, behind a reader-preferred lock since lookups
//! vastly outnumber room creation/deletion.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::ids::{Protocol, RoomId, WorkspaceId};
use crate::message::{RecoveryConfig, RoomInfo, RoomState, VideoConfig};
use crate::room::{self, RoomHandle, RoomMeta};
use crate::FabricError;

#[derive(Default)]
struct Workspace {
    rooms: HashMap<RoomId, RoomHandle>,
}

/// Process-wide handle, cloned cheaply into the HTTP and WS entry points
/// rather than reached for through a module-level singleton.
#[derive(Clone, Default)]
pub struct Registry {
    workspaces: std::sync::Arc<RwLock<HashMap<WorkspaceId, Workspace>>>,
}

#[derive(Default)]
pub struct CreateRoomOptions {
    pub room_id: Option<RoomId>,
    pub video_config: VideoConfig,
    pub recovery_config: RecoveryConfig,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Implicitly creates the workspace, get-or-insert, if this is its
    /// first room.
    pub fn create_room(
        &self,
        workspace_id: WorkspaceId,
        protocol: Protocol,
        options: CreateRoomOptions,
    ) -> Result<RoomHandle, FabricError> {
        let room_id = options.room_id.unwrap_or_else(RoomId::generate);
        let mut workspaces = self.workspaces.write().unwrap();
        let workspace = workspaces.entry(workspace_id.clone()).or_default();
        if workspace.rooms.contains_key(&room_id) {
            return Err(FabricError::RoomExists {
                workspace_id,
                room_id,
            });
        }
        let meta = RoomMeta {
            workspace_id: workspace_id.clone(),
            room_id: room_id.clone(),
            protocol,
            created_at: Utc::now().to_rfc3339(),
        };
        let handle = room::spawn(meta, options.video_config, options.recovery_config);
        workspace.rooms.insert(room_id, handle.clone());
        Ok(handle)
    }

    pub fn get_room(&self, workspace_id: &WorkspaceId, room_id: &RoomId) -> Option<RoomHandle> {
        let workspaces = self.workspaces.read().unwrap();
        workspaces.get(workspace_id)?.rooms.get(room_id).cloned()
    }

    /// Never raises; returns `None` if the room did not exist. Closing live
    /// sessions happens asynchronously inside the room actor after this
    /// call returns.
    pub fn delete_room(&self, workspace_id: &WorkspaceId, room_id: &RoomId) -> Option<RoomHandle> {
        let mut workspaces = self.workspaces.write().unwrap();
        let workspace = workspaces.get_mut(workspace_id)?;
        let handle = workspace.rooms.remove(room_id)?;
        if workspace.rooms.is_empty() {
            workspaces.remove(workspace_id);
        }
        Some(handle)
    }

    /// A snapshot, safe to call concurrently with mutation — the snapshot
    /// is of the set of rooms, not of each room's live state; querying each
    /// room's `RoomInfo` still requires an actor round trip, done by the
    /// caller.
    pub fn list_room_handles(&self, workspace_id: &WorkspaceId) -> Vec<RoomHandle> {
        let workspaces = self.workspaces.read().unwrap();
        workspaces
            .get(workspace_id)
            .map(|ws| ws.rooms.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn list_room_info(&self, workspace_id: &WorkspaceId) -> Vec<RoomInfo> {
        let handles = self.list_room_handles(workspace_id);
        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            infos.push(handle.info().await);
        }
        infos
    }

    pub async fn get_room_info(
        &self,
        workspace_id: &WorkspaceId,
        room_id: &RoomId,
    ) -> Result<RoomInfo, FabricError> {
        let handle = self
            .get_room(workspace_id, room_id)
            .ok_or_else(|| unknown_room(workspace_id, room_id))?;
        Ok(handle.info().await)
    }

    pub async fn get_room_state(
        &self,
        workspace_id: &WorkspaceId,
        room_id: &RoomId,
    ) -> Result<RoomState, FabricError> {
        let handle = self
            .get_room(workspace_id, room_id)
            .ok_or_else(|| unknown_room(workspace_id, room_id))?;
        Ok(handle.state().await)
    }
}

fn unknown_room(workspace_id: &WorkspaceId, room_id: &RoomId) -> FabricError {
    FabricError::UnknownRoom {
        workspace_id: workspace_id.clone(),
        room_id: room_id.clone(),
    }
}
