use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::{Form, WithRejection};
use tracing::info;

use vista_types::api::{
    Ack, AddCommentForm, Claims, CommentAdded, CommentForm, CreatePostForm, Empty, PostCreated,
    PostForm, PostList, PostShared, SharePostForm,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{AjaxForm, PAGE_SIZE, run_db};

// -- Listings --

/// GET /feed
pub async fn feed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let posts = run_db(&state, move |db| db.feed(&viewer, PAGE_SIZE)).await?;
    Ok(Json(Ack::ok(PostList { posts })))
}

/// GET /explore
pub async fn explore(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let posts = run_db(&state, move |db| db.explore(&viewer, PAGE_SIZE)).await?;
    Ok(Json(Ack::ok(PostList { posts })))
}

/// GET /saved
pub async fn saved(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let posts = run_db(&state, move |db| db.saved_posts(&viewer, PAGE_SIZE)).await?;
    Ok(Json(Ack::ok(PostList { posts })))
}

// -- Posts --

/// POST /posts
pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<CreatePostForm>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = claims.sub.to_string();
    let post = run_db(&state, move |db| db.create_post(&owner, &form.media_id, &form.caption)).await?;
    info!("{} published post {}", claims.username, post.id);
    Ok((StatusCode::CREATED, Json(Ack::ok(PostCreated { post }))))
}

/// GET /posts/{id}
pub async fn post_detail(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let detail = run_db(&state, move |db| db.post_detail(&viewer, &post_id)).await?;
    Ok(Json(Ack::ok(detail)))
}

/// DELETE /posts/{id}
pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = claims.sub.to_string();
    run_db(&state, move |db| db.delete_post(&owner, &post_id)).await?;
    Ok(Json(Ack::ok(Empty {})))
}

// -- Engagement --

/// POST /ajax/like-post
pub async fn like_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<PostForm>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let like = run_db(&state, move |db| db.toggle_like(&user_id, &form.post_id)).await?;
    Ok(Json(Ack::ok(like)))
}

/// POST /ajax/save-post
pub async fn save_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<PostForm>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let save = run_db(&state, move |db| db.toggle_save(&user_id, &form.post_id)).await?;
    Ok(Json(Ack::ok(save)))
}

/// POST /ajax/share-post
pub async fn share_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<SharePostForm>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = claims.sub.to_string();
    let message = run_db(&state, move |db| {
        db.share_post(&sender, &form.post_id, &form.conversation_id)
    })
    .await?;
    Ok(Json(Ack::ok(PostShared { message })))
}

/// POST /ajax/add-comment
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<AddCommentForm>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let comment = run_db(&state, move |db| db.add_comment(&user_id, &form.post_id, &form.text)).await?;
    Ok(Json(Ack::ok(CommentAdded { comment })))
}

/// POST /ajax/delete-comment
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<CommentForm>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    run_db(&state, move |db| db.delete_comment(&user_id, &form.comment_id)).await?;
    Ok(Json(Ack::ok(Empty {})))
}

/// POST /ajax/like-comment
pub async fn like_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<CommentForm>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let like = run_db(&state, move |db| db.toggle_comment_like(&user_id, &form.comment_id)).await?;
    Ok(Json(Ack::ok(like)))
}
