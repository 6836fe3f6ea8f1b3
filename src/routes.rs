use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;
use crate::websocket;

pub fn create_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/api/health", get(health_check))
        // Conversation API
        .route("/api/conversation/start", post(start_conversation))
        .route(
            "/api/conversation/:session_id/stream",
            get(websocket::websocket_handler),
        )
        .route(
            "/api/conversation/:session_id/history",
            get(get_history),
        )
        .route("/api/conversation/:session_id", delete(end_conversation))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "providers": {
            "asr": state.config.providers.asr.provider,
            "llm": state.config.providers.llm.provider,
            "tts": state.config.providers.tts.provider,
        }
    }))
}

async fn start_conversation(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let session_id = state.generate_session_id();
    state.history_store.create(&session_id).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
    })?;

    Ok(Json(json!({
        "id": session_id,
        "status": "active",
        "created_at": Utc::now().to_rfc3339(),
    })))
}

async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.history_store.load(&session_id) {
        Ok(Some(turns)) => Ok(Json(json!({
            "session_id": session_id,
            "messages": turns,
            "total_messages": turns.len(),
        }))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Session not found"})),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )),
    }
}

async fn end_conversation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state.history_store.delete(&session_id).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
    })?;

    Ok(Json(json!({
        "message": "Conversation ended",
        "session_id": session_id,
    })))
}
