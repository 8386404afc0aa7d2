pub mod auth;
pub mod conversations;
pub mod error;
pub mod media;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod routes;
pub mod stories;
pub mod users;

use axum::extract::{Json, Query};
use axum_extra::extract::{Form, WithRejection};
use tracing::error;

use vista_db::Database;

use crate::auth::AppState;
use crate::error::ApiError;

/// Form-encoded AJAX body. Repeated keys fill `Vec` fields.
pub type AjaxForm<T> = WithRejection<Form<T>, ApiError>;
pub type JsonBody<T> = WithRejection<Json<T>, ApiError>;
pub type QueryParams<T> = WithRejection<Query<T>, ApiError>;

/// Default page size for listings.
pub const PAGE_SIZE: u32 = 50;

/// Run a store call on the blocking pool; the store holds a synchronous
/// SQLite connection.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> vista_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}
