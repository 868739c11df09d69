//! Backlog retrieval boundary.
//!
//! The storage collaborator is reduced to one request: the ordered message
//! list for a participant pair. Fetches are spawned by the session loop so a
//! slow backlog never blocks live admission; a result that lands after the
//! conversation key changed is discarded by the reconciler's key-match
//! check, which keeps this boundary trivial.

use async_trait::async_trait;
use pairchat_protocol::{ConversationKey, HistoryRecord};

/// Backlog retrieval failure. Non-fatal: the conversation proceeds with an
/// empty view.
#[derive(Debug, thiserror::Error)]
#[error("history fetch failed: {0}")]
pub struct HistoryError(pub String);

/// The storage collaborator's query interface.
#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    /// Ordered backlog of prior messages for one conversation.
    async fn backlog(&self, key: &ConversationKey) -> Result<Vec<HistoryRecord>, HistoryError>;
}
