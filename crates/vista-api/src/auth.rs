use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};
use uuid::Uuid;

use vista_db::Database;
use vista_types::api::{Ack, Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;
use crate::media::MediaStore;
use crate::{JsonBody, run_db};

const MIN_PASSWORD_LEN: usize = 8;
const TOKEN_LIFETIME_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub media: Arc<dyn MediaStore>,
}

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();

    let (name, mail) = (username.clone(), email.clone());
    let (name_taken, email_taken) = run_db(&state, move |db| {
        Ok((db.get_user_by_username(&name)?.is_some(), db.email_taken(&mail)?))
    })
    .await?;
    if name_taken {
        return Err(ApiError::Conflict("username is already taken"));
    }
    if email_taken {
        return Err(ApiError::Conflict("email is already registered"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Password hashing failed: {}", e);
            ApiError::Internal
        })?
        .to_string();

    let user = run_db(&state, move |db| db.create_user(&username, &email, &password_hash)).await?;
    let user_id = parse_user_id(&user.id)?;
    let token = create_token(&state.jwt_secret, user_id, &user.username)?;

    info!("Registered {} ({})", user.username, user.id);
    Ok((
        StatusCode::CREATED,
        Json(Ack::ok(RegisterResponse { user_id, token })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let user = run_db(&state, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(ApiError::Unauthorized("invalid username or password"))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password).map_err(|e| {
        error!("Stored hash for {} is unreadable: {}", user.id, e);
        ApiError::Internal
    })?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized("invalid username or password"))?;

    let user_id = parse_user_id(&user.id)?;
    let token = create_token(&state.jwt_secret, user_id, &user.username)?;

    Ok(Json(Ack::ok(LoginResponse {
        user_id,
        username: user.username,
        token,
    })))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        error!("Token encoding failed: {}", e);
        ApiError::Internal
    })
}

fn parse_user_id(id: &str) -> Result<Uuid, ApiError> {
    id.parse().map_err(|e| {
        error!("User id '{}' is not a uuid: {}", id, e);
        ApiError::Internal
    })
}
