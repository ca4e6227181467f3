//! Front-end settings

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Map, Value as JsonValue};

use crate::config::is_public_setting;
use crate::error::AppError;
use crate::state::AppState;

/// GET /settings - All non-secret settings
pub async fn all(State(state): State<AppState>) -> Json<Map<String, JsonValue>> {
    Json(state.config.settings())
}

/// GET /settings/{key} - A single setting, `null` when unknown
pub async fn one(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Map<String, JsonValue>>, AppError> {
    let key = key.to_uppercase();
    if !is_public_setting(&key) {
        return Err(AppError::BadRequest(format!(
            "Configuration key {key} not available"
        )));
    }

    let value = state
        .config
        .settings()
        .remove(&key)
        .unwrap_or(JsonValue::Null);
    let mut setting = Map::new();
    setting.insert(key, value);
    Ok(Json(setting))
}
