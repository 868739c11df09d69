use axum::serve;
use pairchat_node::{init_tracing, relay, router, AppConfig, AppState, MessageStore};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;
    let store = MessageStore::open(&config.storage_path)?;
    let state = AppState::new(config.clone(), store);

    let relay_addr: SocketAddr = format!("{}:{}", config.host, config.relay_port).parse()?;
    let relay_listener = TcpListener::bind(relay_addr).await?;
    let relay_state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(err) = relay::run(relay_listener, relay_state).await {
            error!(%err, "relay terminated");
        }
    });

    let app = router(Arc::clone(&state));
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, build_id = %config.build_id, "starting PairChat node service");

    serve(listener, app).await?;
    Ok(())
}
