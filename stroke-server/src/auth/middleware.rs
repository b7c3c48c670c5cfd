use axum::{
    extract::{Request, State},
    http::{Method, header},
    middleware::Next,
    response::Response,
};
use stroke_core::auth::AuthenticatedUser;

use crate::infra::{app_state::AppState, errors::AppError};

/// Cookie carrying the session token for thumbnail downloads (image tags).
pub const AUTH_COOKIE: &str = "authToken";

/// Reject requests without a valid session token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&request)
        .ok_or_else(|| AppError::unauthorized("you must be logged in"))?;
    let authenticated = state.auth_service.resolve_token(&token).await?;

    request.extensions_mut().insert(authenticated);
    Ok(next.run(request).await)
}

/// Resolve a token when one is supplied. Anonymous requests pass through; a
/// bad token is still rejected.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(token) = extract_token(&request) {
        let authenticated = state.auth_service.resolve_token(&token).await?;
        request.extensions_mut().insert(authenticated);
    }
    Ok(next.run(request).await)
}

/// Like `optional_auth_middleware`, but a GET may also carry the token in the
/// `authToken` cookie. Only mounted on thumbnail downloads.
pub async fn cookie_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(token) = extract_token_or_cookie(&request) {
        let authenticated = state.auth_service.resolve_token(&token).await?;
        request.extensions_mut().insert(authenticated);
    }
    Ok(next.run(request).await)
}

/// Require a site admin. Must run after `auth_middleware`.
pub async fn admin_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    let authenticated = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| AppError::unauthorized("you must be logged in"))?;
    if !authenticated.user.admin {
        return Err(AppError::forbidden("administrator access required"));
    }
    Ok(next.run(request).await)
}

/// Bearer header first; on GET the `authToken` cookie is also accepted.
pub fn extract_token_or_cookie(request: &Request) -> Option<String> {
    if let Some(token) = extract_token(request) {
        return Some(token);
    }
    if request.method() == Method::GET {
        return extract_cookie_token(request);
    }
    None
}

pub fn extract_token(request: &Request) -> Option<String> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn extract_cookie_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
