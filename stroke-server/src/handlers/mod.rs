pub mod collections;
pub mod files;
pub mod health;
pub mod item;
pub mod jobs;
pub mod series;
pub mod settings;
pub mod study;
pub mod users;

use axum::extract::Extension;
use stroke_core::auth::AuthenticatedUser;
use stroke_core::types::{TokenScope, User};

use crate::infra::errors::AppResult;

/// Caller of a route behind `optional_auth_middleware`.
pub(crate) type MaybeUser = Option<Extension<AuthenticatedUser>>;

pub(crate) fn viewer(caller: &MaybeUser) -> Option<&User> {
    caller.as_ref().map(|Extension(auth)| &auth.user)
}

/// The caller's user, provided the token may modify data.
pub(crate) fn writer(auth: &AuthenticatedUser) -> AppResult<&User> {
    auth.require_scope(TokenScope::DataWrite)?;
    Ok(&auth.user)
}
