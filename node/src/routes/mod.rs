pub mod health;
pub mod history;

use crate::state::AppState;
use axum::Router;
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(history::routes())
        .with_state(state)
}
