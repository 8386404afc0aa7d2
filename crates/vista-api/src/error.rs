use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::FormRejection;
use thiserror::Error;
use tracing::error;

use vista_types::api::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Db(#[from] vista_db::Error),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("file is larger than {0} bytes")]
    PayloadTooLarge(usize),

    #[error("unsupported media type '{0}'")]
    UnsupportedMedia(String),

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use vista_db::Error as Db;

        match self {
            ApiError::Db(err) => match err {
                Db::NotFound(_) => StatusCode::NOT_FOUND,
                Db::NotAMember | Db::NotAdmin | Db::CannotRemoveAdmin => StatusCode::FORBIDDEN,
                Db::InvalidParticipants
                | Db::EmptyContent
                | Db::CannotFollowSelf
                | Db::Invalid(_) => StatusCode::BAD_REQUEST,
                Db::AlreadyExists => StatusCode::CONFLICT,
                Db::Sqlite(_) | Db::Lock(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::BadRequest(rejection.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Storage faults stay in the log.
        let message = match &self {
            ApiError::Db(err) if !err.is_client_error() => {
                error!("Store error: {}", err);
                ApiError::Internal.to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            success: false,
            error: message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = [
            (vista_db::Error::NotFound("post"), StatusCode::NOT_FOUND),
            (vista_db::Error::NotAdmin, StatusCode::FORBIDDEN),
            (vista_db::Error::NotAMember, StatusCode::FORBIDDEN),
            (vista_db::Error::EmptyContent, StatusCode::BAD_REQUEST),
            (vista_db::Error::AlreadyExists, StatusCode::CONFLICT),
            (vista_db::Error::Lock("poisoned".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let response = ApiError::from(vista_db::Error::Lock("secret detail".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
