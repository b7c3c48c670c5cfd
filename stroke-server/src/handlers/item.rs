use axum::{
    body::Body,
    extract::{Extension, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use stroke_core::{
    auth::AuthenticatedUser,
    thumbnails::Job,
    types::{CounterOutcome, Item, ItemId},
};
use tokio_util::io::ReaderStream;
use tracing::info;

use super::{MaybeUser, viewer, writer};
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedItemResponse {
    pub item: Item,
    pub files_removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_series: Option<i64>,
}

pub async fn delete_item_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(item_id): Path<ItemId>,
) -> AppResult<Json<RemovedItemResponse>> {
    let user = writer(&auth)?;
    let removed = state.catalog.remove_item(user, item_id).await?;

    let n_series = match removed.series_count {
        Some(CounterOutcome::Applied(n)) => Some(n),
        _ => None,
    };
    Ok(Json(RemovedItemResponse {
        item: removed.item,
        files_removed: removed.files_removed,
        n_series,
    }))
}

/// Purge the item's artifacts and start a thumbnail job for it.
pub async fn generate_thumbnail_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(item_id): Path<ItemId>,
) -> AppResult<(StatusCode, Json<Job>)> {
    let user = writer(&auth)?;
    let handle = state.thumbnails.generate_thumbnail(user, item_id).await?;
    info!(job = %handle.id(), item = %item_id, "thumbnail generation requested");
    Ok((StatusCode::ACCEPTED, Json(handle.snapshot())))
}

/// Stream one artifact by uid.
pub async fn get_thumbnail_handler(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path((item_id, uid)): Path<(ItemId, String)>,
) -> AppResult<Response> {
    let content = state
        .thumbnails
        .get_thumbnail(viewer(&caller), item_id, &uid)
        .await?;

    let disposition = format!("attachment; filename=\"{}\"", content.file.name.replace('"', ""));
    let body = Body::from_stream(ReaderStream::new(content.body));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content.file.mime_type)
        .header(header::CONTENT_LENGTH, content.file.size)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(body)
        .map(IntoResponse::into_response)
        .map_err(|e| AppError::internal(format!("failed to build response: {e}")))
}
