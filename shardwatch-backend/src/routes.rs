use crate::error::AppError;
use crate::validation;
use crate::AppState;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use axum_macros::debug_handler;
use chrono::Utc;
use serde::Serialize;
use shardwatch_db::ServerRecord;
use std::sync::Arc;

#[derive(Serialize)]
pub(crate) struct ServerView {
    #[serde(flatten)]
    record: ServerRecord,
    /// Observed change not yet settled by the notice pass
    pending: bool,
    /// Missing from recent status snapshots
    stale: bool,
}

#[derive(Serialize)]
pub(crate) struct ServerList {
    servers: Vec<ServerView>,
}

fn view(state: &AppState, record: &ServerRecord) -> ServerView {
    ServerView {
        pending: record.is_pending(),
        stale: record.is_stale(Utc::now(), state.stale_after),
        record: record.clone(),
    }
}

#[debug_handler]
pub(crate) async fn list_servers(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let servers = {
        let store = state.store.lock().await;
        store
            .records()
            .iter()
            .map(|record| view(&state, record))
            .collect()
    };

    Ok(Json(ServerList { servers }))
}

#[debug_handler]
pub(crate) async fn get_server(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_server_name(&name)?;

    let found = {
        let store = state.store.lock().await;
        store.find(&name).map(|record| view(&state, record))
    };

    found.map(Json).ok_or(AppError::ServerNotFound(name))
}
