use std::env;
use std::path::PathBuf;
use uuid::Uuid;

/// Runtime configuration for the node service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    /// HTTP port for the history and health routes.
    pub port: u16,
    /// TCP port for the live relay.
    pub relay_port: u16,
    pub storage_path: PathBuf,
    pub build_id: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let relay_port = env::var("RELAY_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5001);
        let storage_path = env::var("PAIRCHAT_STORAGE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("pairchat-data"));
        let build_id =
            env::var("PAIRCHAT_BUILD_ID").unwrap_or_else(|_| Uuid::new_v4().to_string());
        Ok(Self {
            host,
            port,
            relay_port,
            storage_path,
            build_id,
        })
    }
}
