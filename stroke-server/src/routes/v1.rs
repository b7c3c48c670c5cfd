use axum::{
    Router, middleware,
    routing::{delete, get, post},
};

use crate::{
    AppState,
    auth::{
        admin_middleware, auth_middleware, cookie_auth_middleware, optional_auth_middleware,
    },
    handlers::{collections, files, health, item, jobs, series, settings, study, users},
};

/// Create all v1 API routes
pub fn create_v1_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/user", post(users::register_handler))
        .route("/user/authentication", post(users::login_handler))
        .merge(create_browse_routes(state.clone()))
        .merge(create_download_routes(state.clone()))
        .merge(create_protected_routes(state.clone()))
        .merge(create_admin_routes(state))
}

/// Readable anonymously; a token, when present, widens what is visible.
fn create_browse_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/study", get(study::list_studies_handler))
        .route("/series", get(series::list_series_handler))
        .route_layer(middleware::from_fn_with_state(
            state,
            optional_auth_middleware,
        ))
}

/// Thumbnail downloads, which browsers fetch from image tags with the
/// session cookie instead of a bearer header.
fn create_download_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/item/{id}/dicom_thumbnail/{uid}",
            get(item::get_thumbnail_handler),
        )
        .route_layer(middleware::from_fn_with_state(state, cookie_auth_middleware))
}

/// Create protected routes that require authentication
fn create_protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/study", post(study::create_study_handler))
        .route("/series", post(series::create_series_handler))
        .route("/item/{id}", delete(item::delete_item_handler))
        .route(
            "/item/{id}/dicom_thumbnail",
            post(item::generate_thumbnail_handler),
        )
        .route("/file", post(files::upload_file_handler))
        .route("/job/{id}", get(jobs::get_job_handler))
        .route("/user/me", get(users::me_handler))
        .route("/user/authentication", delete(users::logout_handler))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Create admin routes
fn create_admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/collection", post(collections::create_collection_handler))
        .route("/collection/{id}", get(collections::get_collection_handler))
        .route(
            "/system/setting",
            get(settings::get_setting_handler).put(settings::set_setting_handler),
        )
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
