use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

// Liveness probe; reports the configured model without touching upstream
async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": state.model,
    }))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new().route("/status", get(status)).with_state(state)
}
