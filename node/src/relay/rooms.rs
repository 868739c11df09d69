//! Room registry mapping conversation rooms to connected members.

use pairchat_protocol::wire::ServerFrame;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

struct RoomMember {
    id: Uuid,
    tx: mpsc::UnboundedSender<ServerFrame>,
}

/// Connection membership per room, shared across relay connection tasks.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<String, Vec<RoomMember>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member's outbound sender; returns its membership id.
    pub async fn join(&self, room: &str, tx: mpsc::UnboundedSender<ServerFrame>) -> Uuid {
        let id = Uuid::new_v4();
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_owned())
            .or_default()
            .push(RoomMember { id, tx });
        id
    }

    pub async fn leave(&self, room: &str, member: Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.retain(|m| m.id != member);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Deliver a frame to every member of a room, pruning members whose
    /// connection task has gone away. Returns the delivery count.
    pub async fn broadcast(&self, room: &str, frame: &ServerFrame) -> usize {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(room) else {
            return 0;
        };
        members.retain(|m| m.tx.send(frame.clone()).is_ok());
        let delivered = members.len();
        if members.is_empty() {
            rooms.remove(room);
        }
        delivered
    }

    pub async fn occupancy(&self, room: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|members| members.len())
            .unwrap_or(0)
    }
}
