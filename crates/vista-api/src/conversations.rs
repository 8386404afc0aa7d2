use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use axum_extra::extract::{Form, WithRejection};
use tracing::info;

use vista_types::api::{
    Ack, AddMembersForm, Claims, ConversationCreated, ConversationForm, ConversationList,
    CreateConversationForm, CreateGroupForm, Empty, GroupLeft, GroupMemberForm, GroupSearchForm,
    GroupSearchResults, MembersAdded, MessageSent, SendMessageForm,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{AjaxForm, PAGE_SIZE, run_db};

/// Messages returned with a conversation.
const HISTORY_LIMIT: u32 = 200;

// -- Reads --

/// GET /conversations
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let conversations =
        run_db(&state, move |db| db.list_conversations(&user_id, PAGE_SIZE)).await?;
    Ok(Json(Ack::ok(ConversationList { conversations })))
}

/// GET /conversations/{id}. Viewing marks the other members' messages read.
pub async fn detail(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let detail = run_db(&state, move |db| {
        db.conversation_detail(&conversation_id, &viewer, HISTORY_LIMIT)
    })
    .await?;
    Ok(Json(Ack::ok(detail)))
}

/// POST /ajax/search-users. Group candidates who are not members yet.
pub async fn search_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<GroupSearchForm>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub.to_string();
    let users = run_db(&state, move |db| {
        db.search_users_for_group(&form.conversation_id, &viewer, &form.query)
    })
    .await?;
    Ok(Json(Ack::ok(GroupSearchResults { users })))
}

// -- Lifecycle --

/// POST /ajax/create-conversation
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<CreateConversationForm>,
) -> Result<impl IntoResponse, ApiError> {
    let requester = claims.sub.to_string();
    let conversation_id = run_db(&state, move |db| {
        db.create_conversation(&requester, &form.participants)
    })
    .await?;
    Ok(Json(Ack::ok(ConversationCreated { conversation_id })))
}

/// POST /ajax/create-group
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<CreateGroupForm>,
) -> Result<impl IntoResponse, ApiError> {
    let requester = claims.sub.to_string();
    let conversation_id = run_db(&state, move |db| {
        let image = form.group_image_media_id.as_deref().filter(|id| !id.trim().is_empty());
        db.create_group(&requester, &form.group_name, &form.participants, image)
    })
    .await?;
    info!("{} created group {}", claims.username, conversation_id);
    Ok(Json(Ack::ok(ConversationCreated { conversation_id })))
}

/// POST /ajax/send-message
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<SendMessageForm>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = claims.sub.to_string();
    let message = run_db(&state, move |db| {
        let media = form.media_id.as_deref().filter(|id| !id.trim().is_empty());
        db.send_message(&form.conversation_id, &sender, &form.text, media)
    })
    .await?;
    Ok(Json(Ack::ok(MessageSent { message })))
}

/// POST /ajax/remove-group-member
pub async fn remove_group_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<GroupMemberForm>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = claims.sub.to_string();
    run_db(&state, move |db| {
        db.remove_group_member(&form.conversation_id, &actor, form.username.trim())
    })
    .await?;
    Ok(Json(Ack::ok(Empty {})))
}

/// POST /ajax/leave-group
pub async fn leave_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<ConversationForm>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let deleted = run_db(&state, move |db| db.leave_group(&form.conversation_id, &user_id)).await?;
    Ok(Json(Ack::ok(GroupLeft { deleted })))
}

/// POST /ajax/delete-group
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<ConversationForm>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = claims.sub.to_string();
    run_db(&state, move |db| db.delete_group(&form.conversation_id, &actor)).await?;
    Ok(Json(Ack::ok(Empty {})))
}

/// POST /ajax/add-group-members
pub async fn add_group_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<AddMembersForm>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = claims.sub.to_string();
    let added_users = run_db(&state, move |db| {
        db.add_group_members(&form.conversation_id, &actor, &form.usernames)
    })
    .await?;
    Ok(Json(Ack::ok(MembersAdded { added_users })))
}
