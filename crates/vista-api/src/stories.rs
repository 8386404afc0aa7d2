use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::{Form, WithRejection};

use vista_types::api::{Ack, Claims, CreateStoryForm, Empty, StoryCreated, StoryList};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{AjaxForm, run_db};

/// GET /stories
pub async fn active(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let stories = run_db(&state, move |db| db.active_stories(&viewer)).await?;
    Ok(Json(Ack::ok(StoryList { stories })))
}

/// POST /stories
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<CreateStoryForm>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let story = run_db(&state, move |db| db.create_story(&user_id, &form.media_id, &form.text)).await?;
    Ok((StatusCode::CREATED, Json(Ack::ok(StoryCreated { story }))))
}

/// DELETE /stories/{id}
pub async fn delete(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    run_db(&state, move |db| db.delete_story(&user_id, &story_id)).await?;
    Ok(Json(Ack::ok(Empty {})))
}
