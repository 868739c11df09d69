use crate::config::AppConfig;
use crate::relay::RoomRegistry;
use crate::storage::MessageStore;
use std::sync::Arc;

pub struct AppState {
    config: AppConfig,
    store: MessageStore,
    rooms: RoomRegistry,
}

impl AppState {
    pub fn new(config: AppConfig, store: MessageStore) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            rooms: RoomRegistry::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_id(&self) -> &str {
        &self.config.build_id
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }
}
