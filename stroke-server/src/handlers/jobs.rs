use axum::{
    extract::{Extension, Path, State},
    response::Json,
};
use stroke_core::{
    auth::AuthenticatedUser,
    thumbnails::Job,
    types::JobId,
};

use crate::infra::{app_state::AppState, errors::AppResult};

pub async fn get_job_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(job_id): Path<JobId>,
) -> AppResult<Json<Job>> {
    let job = state.thumbnails.get_job(&auth.user, job_id)?;
    Ok(Json(job))
}
