use axum::{
    body::Body,
    extract::{Extension, Query, State},
    http::StatusCode,
    response::Json,
};
use futures::TryStreamExt;
use serde::Deserialize;
use stroke_core::{
    auth::AuthenticatedUser,
    types::{FileRecord, ItemId},
};
use tokio_util::io::StreamReader;

use super::writer;
use crate::infra::{app_state::AppState, errors::AppResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQuery {
    pub item_id: ItemId,
    pub name: String,
    pub mime_type: Option<String>,
    pub reference: Option<String>,
}

/// Single-chunk upload. The request body is the file content.
pub async fn upload_file_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(query): Query<UploadQuery>,
    body: Body,
) -> AppResult<(StatusCode, Json<FileRecord>)> {
    let user = writer(&auth)?;
    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let reader = StreamReader::new(stream);

    let file = state
        .uploads
        .upload(
            user,
            query.item_id,
            &query.name,
            query.mime_type.as_deref(),
            query.reference,
            reader,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(file)))
}
