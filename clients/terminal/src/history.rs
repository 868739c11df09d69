//! Backlog fetching over the node's history API.

use async_trait::async_trait;
use pairchat_protocol::{ConversationKey, HistoryRecord};
use pairchat_sync::{HistoryError, HistoryStore};

pub struct HttpHistoryStore {
    base: String,
    client: reqwest::Client,
}

impl HttpHistoryStore {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self {
            base,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl HistoryStore for HttpHistoryStore {
    async fn backlog(&self, key: &ConversationKey) -> Result<Vec<HistoryRecord>, HistoryError> {
        let (a, b) = key.members();
        let url = format!("{}/history/{}/{}", self.base, a, b);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| HistoryError(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| HistoryError(e.to_string()))
    }
}
