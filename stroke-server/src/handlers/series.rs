use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use stroke_core::{
    auth::AuthenticatedUser,
    types::{FolderId, Item, Page, SeriesSortField, paging::parse_sort},
};

use super::{MaybeUser, viewer, writer};
use crate::infra::{app_state::AppState, errors::AppResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSeriesQuery {
    pub study_id: FolderId,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort: Option<String>,
    pub sortdir: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSeriesRequest {
    pub study_id: FolderId,
    pub name: String,
}

pub async fn list_series_handler(
    State(state): State<AppState>,
    caller: MaybeUser,
    Query(query): Query<ListSeriesQuery>,
) -> AppResult<Json<Vec<Item>>> {
    let sort = parse_sort::<SeriesSortField>(query.sort.as_deref(), query.sortdir)?;
    let page = Page::new(query.limit, query.offset);
    let series = state
        .catalog
        .list_series(viewer(&caller), query.study_id, sort, page)
        .await?;
    Ok(Json(series))
}

pub async fn create_series_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(request): Json<CreateSeriesRequest>,
) -> AppResult<(StatusCode, Json<Item>)> {
    let user = writer(&auth)?;
    let series = state
        .catalog
        .create_series(user, request.study_id, &request.name)
        .await?;
    Ok((StatusCode::CREATED, Json(series)))
}
