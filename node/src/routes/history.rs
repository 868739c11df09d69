use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use pairchat_protocol::{ConversationKey, HistoryRecord};
use std::sync::Arc;
use tracing::{debug, warn};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/history/:a/:b", get(history))
}

/// Ordered backlog for the participant pair, oldest first.
async fn history(
    State(state): State<Arc<AppState>>,
    Path((a, b)): Path<(String, String)>,
) -> Result<Json<Vec<HistoryRecord>>, StatusCode> {
    let key = ConversationKey::new(a.into(), b.into()).map_err(|err| {
        debug!(%err, "rejecting malformed history request");
        StatusCode::BAD_REQUEST
    })?;

    let records = state.store().history(&key.room_id()).map_err(|err| {
        warn!(%err, "history lookup failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(records))
}
