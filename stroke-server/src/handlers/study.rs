use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use stroke_core::{
    auth::AuthenticatedUser,
    catalog::NewStudy,
    types::{Folder, Page, StudySortField, paging::parse_sort},
};
use tracing::debug;

use super::{MaybeUser, viewer, writer};
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

#[derive(Debug, Deserialize)]
pub struct ListStudiesQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort: Option<String>,
    pub sortdir: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudyRequest {
    pub patient_id: String,
    pub date: String,
    pub modality: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub public: bool,
}

/// Studies the caller can read, permission-filtered before paging.
pub async fn list_studies_handler(
    State(state): State<AppState>,
    caller: MaybeUser,
    Query(query): Query<ListStudiesQuery>,
) -> AppResult<Json<Vec<Folder>>> {
    let sort = parse_sort::<StudySortField>(query.sort.as_deref(), query.sortdir)?;
    let page = Page::new(query.limit, query.offset);
    let studies = state.catalog.list_studies(viewer(&caller), sort, page).await?;
    debug!(count = studies.len(), "listed studies");
    Ok(Json(studies))
}

pub async fn create_study_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(request): Json<CreateStudyRequest>,
) -> AppResult<(StatusCode, Json<Folder>)> {
    let user = writer(&auth)?;
    let study_date = parse_study_date(&request.date)?;

    let study = state
        .catalog
        .create_study(
            user,
            NewStudy {
                patient_id: request.patient_id,
                study_date,
                modality: request.modality,
                description: request.description,
                public: request.public,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(study)))
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
fn parse_study_date(raw: &str) -> AppResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| AppError::bad_request(format!("invalid study date: {raw:?}")))
}
