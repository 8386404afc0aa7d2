use axum::{Extension, Json, extract::State, response::IntoResponse};
use axum_extra::extract::{Form, WithRejection};

use vista_types::api::{Ack, Claims, MarkReadForm, MarkedRead, NotificationPage};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{AjaxForm, PAGE_SIZE, run_db};

/// GET /notifications
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let page = run_db(&state, move |db| {
        Ok(NotificationPage {
            notifications: db.list_notifications(&user_id, PAGE_SIZE)?,
            unread_count: db.unread_notification_count(&user_id)?,
        })
    })
    .await?;
    Ok(Json(Ack::ok(page)))
}

/// POST /notifications/read. No ids marks everything read.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Form(form), _): AjaxForm<MarkReadForm>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let updated = run_db(&state, move |db| db.mark_notifications_read(&user_id, &form.ids)).await?;
    Ok(Json(Ack::ok(MarkedRead { updated })))
}
