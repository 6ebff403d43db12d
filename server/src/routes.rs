use axum::{extract::State, Json, Router};
use serde_json::json;

use crate::chat::{messages, presence};
use crate::state::AppState;
use crate::voice::calls;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    // WebSocket endpoint (identity asserted in-band via `identify`)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Hooks for the chat backend
    let delivery_routes = Router::new()
        .route(
            "/api/messages/deliver",
            axum::routing::post(messages::deliver_message),
        )
        .route("/api/calls", axum::routing::post(calls::log_call))
        .route("/api/calls/{id}", axum::routing::patch(calls::update_call));

    let presence_routes = Router::new().route(
        "/api/presence/{user_id}",
        axum::routing::get(presence::get_presence),
    );

    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(ws_routes)
        .merge(delivery_routes)
        .merge(presence_routes)
        .merge(health)
        .with_state(state)
}

/// Health check with live connection counts
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "connections": state.registry.connection_count(),
        "online_users": state.registry.online_count(),
    }))
}
