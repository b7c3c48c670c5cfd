use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use stroke_core::{
    auth::AuthenticatedUser,
    settings::NewCollection,
    types::{Collection, CollectionId},
};

use super::writer;
use crate::infra::{app_state::AppState, errors::AppResult};

#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub public: bool,
}

pub async fn create_collection_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(request): Json<CreateCollectionRequest>,
) -> AppResult<(StatusCode, Json<Collection>)> {
    let user = writer(&auth)?;
    let collection = state
        .settings
        .create_collection(
            user,
            NewCollection {
                name: request.name,
                description: request.description,
                public: request.public,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(collection)))
}

pub async fn get_collection_handler(
    State(state): State<AppState>,
    Path(id): Path<CollectionId>,
) -> AppResult<Json<Collection>> {
    Ok(Json(state.settings.get_collection(id).await?))
}
