use std::path::Path;

use anyhow::{Context, Result};
use pairchat_protocol::HistoryRecord;
use serde::{Deserialize, Serialize};

/// Persistent, ordered message log keyed by conversation room.
#[derive(Clone)]
pub struct MessageStore {
    db: sled::Db,
}

#[derive(Clone, Serialize, Deserialize)]
struct StoredMessage {
    record: HistoryRecord,
    stored_ms: i64,
}

impl MessageStore {
    const TREE: &'static str = "messages";

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create storage directory {:?}", path))?;
        let db = sled::open(path)
            .with_context(|| format!("failed to open sled database at {:?}", path))?;
        Ok(Self { db })
    }

    fn tree(&self) -> sled::Result<sled::Tree> {
        self.db.open_tree(Self::TREE)
    }

    /// Append one message to a room's log. The assigned sequence is
    /// monotonic across the store, so per-room order follows append order.
    pub fn append(&self, room: &str, record: &HistoryRecord) -> Result<u64> {
        let tree = self.tree()?;
        let seq = self.db.generate_id()?;

        let stored_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;

        let stored = StoredMessage {
            record: record.clone(),
            stored_ms,
        };
        let encoded = bincode::serialize(&stored)?;
        tree.insert(Self::entry_key(room, seq), encoded)?;
        tree.flush()?;
        Ok(seq)
    }

    /// Ordered backlog for one room.
    pub fn history(&self, room: &str) -> Result<Vec<HistoryRecord>> {
        let tree = self.tree()?;
        let mut records = Vec::new();
        for entry in tree.scan_prefix(Self::room_prefix(room)) {
            let (_, value) = entry?;
            let stored: StoredMessage = bincode::deserialize(&value)
                .context("stored message record failed to decode")?;
            records.push(stored.record);
        }
        Ok(records)
    }

    fn room_prefix(room: &str) -> Vec<u8> {
        let mut prefix = room.as_bytes().to_vec();
        prefix.push(0);
        prefix
    }

    fn entry_key(room: &str, seq: u64) -> Vec<u8> {
        let mut key = Self::room_prefix(room);
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }
}
