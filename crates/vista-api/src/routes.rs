use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use vista_types::models::MediaKind;

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{conversations, media, notifications, posts, stories, users};

/// Every HTTP route. Cross-cutting layers (CORS, tracing) are added by the server.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/media/{media_id}", get(media::serve_media))
        .route("/health", get(health));

    let upload_routes = Router::new()
        .route("/media", post(media::upload_media))
        .layer(DefaultBodyLimit::max(MediaKind::Video.max_bytes()));

    let protected_routes = Router::new()
        // Users
        .route("/users/search", get(users::search))
        .route("/users/suggested", get(users::suggested))
        .route("/users/{username}", get(users::profile))
        .route("/profile", post(users::edit_profile))
        .route("/ajax/follow-user", post(users::follow))
        // Posts
        .route("/feed", get(posts::feed))
        .route("/explore", get(posts::explore))
        .route("/saved", get(posts::saved))
        .route("/posts", post(posts::create_post))
        .route("/posts/{post_id}", get(posts::post_detail).delete(posts::delete_post))
        .route("/ajax/like-post", post(posts::like_post))
        .route("/ajax/save-post", post(posts::save_post))
        .route("/ajax/share-post", post(posts::share_post))
        .route("/ajax/add-comment", post(posts::add_comment))
        .route("/ajax/delete-comment", post(posts::delete_comment))
        .route("/ajax/like-comment", post(posts::like_comment))
        // Stories
        .route("/stories", get(stories::active).post(stories::create))
        .route("/stories/{story_id}", delete(stories::delete))
        // Conversations
        .route("/conversations", get(conversations::list))
        .route("/conversations/{conversation_id}", get(conversations::detail))
        .route("/ajax/create-conversation", post(conversations::create_conversation))
        .route("/ajax/create-group", post(conversations::create_group))
        .route("/ajax/send-message", post(conversations::send_message))
        .route("/ajax/remove-group-member", post(conversations::remove_group_member))
        .route("/ajax/leave-group", post(conversations::leave_group))
        .route("/ajax/delete-group", post(conversations::delete_group))
        .route("/ajax/add-group-members", post(conversations::add_group_members))
        .route("/ajax/search-users", post(conversations::search_users))
        // Notifications
        .route("/notifications", get(notifications::list))
        .route("/notifications/read", post(notifications::mark_read))
        .merge(upload_routes)
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

pub async fn health() -> &'static str {
    "ok"
}
