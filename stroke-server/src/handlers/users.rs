use axum::{
    extract::{Extension, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stroke_core::{
    auth::{AuthenticatedUser, RegisterUser},
    types::{TokenScope, User},
};
use tracing::info;

use crate::auth::AUTH_COOKIE;
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub login: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthTokenBody {
    pub token: String,
    pub expires: DateTime<Utc>,
    pub scope: Vec<TokenScope>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: User,
    pub auth_token: AuthTokenBody,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: &'static str,
}

pub async fn register_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state
        .auth_service
        .register(RegisterUser {
            login: request.login,
            email: request.email,
            first_name: request.first_name,
            last_name: request.last_name,
            password: request.password,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Exchange credentials for a session token. The token is returned in the
/// body and also set as the `authToken` cookie.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let issued = state
        .auth_service
        .login(&request.login, &request.password)
        .await?;

    let max_age = (issued.token.expires_at() - Utc::now()).num_seconds().max(0);
    let cookie = format!(
        "{AUTH_COOKIE}={}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax",
        issued.token.as_str()
    );
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|e| AppError::internal(format!("invalid cookie header: {e}")))?,
    );

    info!(user = %issued.user.id, "user logged in");
    Ok((
        headers,
        Json(LoginResponse {
            auth_token: AuthTokenBody {
                token: issued.token.as_str().to_string(),
                expires: issued.token.expires_at(),
                scope: issued.scopes,
            },
            user: issued.user,
        }),
    ))
}

pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> AppResult<(HeaderMap, Json<LogoutResponse>)> {
    state.auth_service.revoke_session(&auth.session).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("authToken=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax"),
    );
    Ok((
        headers,
        Json(LogoutResponse {
            message: "logged out",
        }),
    ))
}

pub async fn me_handler(Extension(auth): Extension<AuthenticatedUser>) -> Json<User> {
    Json(auth.user)
}
