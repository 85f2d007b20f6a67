//! Health check
//!
//! GET /health answers 200 while the database responds to a ping.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState};

pub async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.pool.ping().await.map_err(ApiError::dependency)?;

    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
