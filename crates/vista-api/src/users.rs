use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use axum_extra::extract::{Form, WithRejection};

use vista_db::models::ProfileUpdate;
use vista_types::api::{Ack, Claims, EditProfileForm, FollowForm, ProfileSaved, SearchForm, SearchResults};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{AjaxForm, PAGE_SIZE, QueryParams, run_db};

const SEARCH_LIMIT: u32 = 10;
const SUGGESTION_LIMIT: u32 = 5;

/// GET /users/{username}
pub async fn profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let page = run_db(&state, move |db| db.profile_page(&viewer, &username, PAGE_SIZE)).await?;
    Ok(Json(Ack::ok(page)))
}

/// POST /profile
pub async fn edit_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<EditProfileForm>,
) -> Result<impl IntoResponse, ApiError> {
    let update = ProfileUpdate {
        full_name: form.full_name,
        bio: form.bio,
        website: form.website,
        phone_number: form.phone_number,
        avatar_media_id: form.avatar_media_id.filter(|id| !id.trim().is_empty()),
        is_private: form.is_private,
    };
    let user_id = claims.sub.to_string();
    let user = run_db(&state, move |db| db.update_profile(&user_id, &update)).await?;
    Ok(Json(Ack::ok(ProfileSaved {
        profile: user.profile(),
    })))
}

/// GET /users/search?query=
pub async fn search(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(form), _): QueryParams<SearchForm>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let results = run_db(&state, move |db| db.search_users(&viewer, &form.query, SEARCH_LIMIT)).await?;
    Ok(Json(Ack::ok(SearchResults { results })))
}

/// GET /users/suggested
pub async fn suggested(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let results = run_db(&state, move |db| db.suggested_users(&viewer, SUGGESTION_LIMIT)).await?;
    Ok(Json(Ack::ok(SearchResults { results })))
}

/// POST /ajax/follow-user
pub async fn follow(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<FollowForm>,
) -> Result<impl IntoResponse, ApiError> {
    let follower = claims.sub.to_string();
    let follow = run_db(&state, move |db| db.toggle_follow(&follower, form.username.trim())).await?;
    Ok(Json(Ack::ok(follow)))
}
