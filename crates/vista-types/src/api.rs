use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::NotificationKind;

// -- JWT Claims --

/// Bearer token claims. `sub` is the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Envelope --

/// Every AJAX response carries `success`; the payload is flattened beside it.
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Ack<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub bio: String,
    pub website: String,
    pub phone_number: String,
    pub avatar_url: Option<String>,
    pub is_private: bool,
    pub followers_count: i64,
    pub following_count: i64,
    pub posts_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfilePage {
    pub profile: Profile,
    pub posts: Vec<PostView>,
    pub is_following: bool,
}

#[derive(Debug, Deserialize)]
pub struct EditProfileForm {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub phone_number: String,
    pub avatar_media_id: Option<String>,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileSaved {
    pub profile: Profile,
}

#[derive(Debug, Deserialize)]
pub struct SearchForm {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResults {
    pub results: Vec<UserSummary>,
}

#[derive(Debug, Deserialize)]
pub struct FollowForm {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FollowState {
    pub following: bool,
    pub followers_count: i64,
}

// -- Posts --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    pub id: String,
    pub author: UserSummary,
    pub media_url: String,
    pub caption: String,
    pub likes_count: i64,
    pub comments_count: i64,
    pub liked_by_me: bool,
    pub saved_by_me: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: PostView,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostList {
    pub posts: Vec<PostView>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePostForm {
    pub media_id: String,
    #[serde(default)]
    pub caption: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostCreated {
    pub post: PostView,
}

#[derive(Debug, Deserialize)]
pub struct PostForm {
    pub post_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeState {
    pub liked: bool,
    pub likes_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveState {
    pub saved: bool,
}

#[derive(Debug, Deserialize)]
pub struct SharePostForm {
    pub post_id: String,
    pub conversation_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostShared {
    pub message: MessageView,
}

// -- Comments --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub author: UserSummary,
    pub text: String,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentForm {
    pub post_id: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentAdded {
    pub comment: CommentView,
}

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    pub comment_id: String,
}

// -- Stories --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryView {
    pub id: String,
    pub author: UserSummary,
    pub media_url: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateStoryForm {
    pub media_id: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoryList {
    pub stories: Vec<StoryView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoryCreated {
    pub story: StoryView,
}

// -- Media --

#[derive(Debug, Serialize, Deserialize)]
pub struct MediaUploaded {
    pub media_id: String,
    pub url: String,
}

// -- Conversations --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: String,
    pub conversation_id: String,
    pub sender: UserSummary,
    pub text: String,
    pub media_url: Option<String>,
    pub shared_post_id: Option<String>,
    pub is_system: bool,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub is_group: bool,
    pub group_name: String,
    pub group_image_url: Option<String>,
    pub admin: Option<UserSummary>,
    pub members: Vec<UserSummary>,
    pub last_message: Option<MessageView>,
    pub has_unread: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub conversation: ConversationSummary,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationList {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Deserialize)]
pub struct CreateConversationForm {
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupForm {
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub participants: Vec<String>,
    pub group_image_media_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationCreated {
    pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageForm {
    pub conversation_id: String,
    #[serde(default)]
    pub text: String,
    pub media_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageSent {
    pub message: MessageView,
}

#[derive(Debug, Deserialize)]
pub struct ConversationForm {
    pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupMemberForm {
    pub conversation_id: String,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupLeft {
    /// True when the leaver was the last member and the group is gone.
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddMembersForm {
    pub conversation_id: String,
    #[serde(default)]
    pub usernames: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembersAdded {
    pub added_users: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GroupSearchForm {
    pub conversation_id: String,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupSearchResults {
    pub users: Vec<UserSummary>,
}

// -- Notifications --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationView {
    pub id: String,
    pub actor: UserSummary,
    pub kind: NotificationKind,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub conversation_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationPage {
    pub notifications: Vec<NotificationView>,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadForm {
    /// Empty means "all of mine".
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkedRead {
    pub updated: usize,
}
