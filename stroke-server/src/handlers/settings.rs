use axum::{
    extract::{Extension, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::Value;
use stroke_core::auth::AuthenticatedUser;

use super::writer;
use crate::infra::{app_state::AppState, errors::AppResult};

#[derive(Debug, Deserialize)]
pub struct SettingQuery {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct SetSettingRequest {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

/// Current value of a setting; `null` when unset.
pub async fn get_setting_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(query): Query<SettingQuery>,
) -> AppResult<Json<Value>> {
    let value = state.settings.get_setting(&auth.user, &query.key).await?;
    Ok(Json(value.unwrap_or(Value::Null)))
}

pub async fn set_setting_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(request): Json<SetSettingRequest>,
) -> AppResult<Json<Value>> {
    let user = writer(&auth)?;
    state
        .settings
        .set_setting(user, &request.key, request.value.clone())
        .await?;
    Ok(Json(request.value))
}
