use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};
use uuid::Uuid;

use herald_db::StoreError;
use herald_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::AppState;
use crate::error::{ApiError, blocking};

const TOKEN_LIFETIME_DAYS: i64 = 30;

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(StoreError::InvalidInput("username must be 3-32 characters".into()).into());
    }
    if req.password.len() < 8 {
        return Err(StoreError::InvalidInput("password must be at least 8 characters".into()).into());
    }

    let user_id = Uuid::new_v4();
    let db = state.db.clone();
    let username = req.username.clone();
    let password = req.password;

    // Hashing is slow; run it and the insert off the async runtime.
    // A taken username surfaces as Conflict from the UNIQUE constraint.
    blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| StoreError::Unavailable(format!("password hashing failed: {e}")))?
            .to_string();

        db.create_user(&user_id.to_string(), &username, &password_hash)
    })
    .await?;

    info!("Registered user {} ({})", req.username, user_id);

    let token = create_token(&state.jwt_secret, user_id, &req.username)?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let username = req.username;
    let password = req.password;

    let user = blocking(move || {
        let user = db
            .get_user_by_username(&username)?
            .ok_or(ApiError::Unauthorized)?;

        let parsed_hash = PasswordHash::new(&user.password).map_err(|e| {
            error!("Corrupt password hash for {}: {}", user.username, e);
            ApiError::Internal
        })?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Unauthorized)?;

        Ok::<_, ApiError>(user)
    })
    .await?;

    let user_id: Uuid = user.id.parse().map_err(|e| {
        error!("Corrupt user id '{}': {}", user.id, e);
        ApiError::Internal
    })?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)?;
    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

fn create_token(secret: &str, user_id: Uuid, username: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp()
            as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        error!("Failed to sign token: {}", e);
        ApiError::Internal
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::verify_token;

    #[test]
    fn tokens_round_trip_through_verification() {
        let user_id = Uuid::new_v4();
        let token = create_token("test-secret", user_id, "ada").unwrap();

        let claims = verify_token("test-secret", &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.username, "ada");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_token("test-secret", Uuid::new_v4(), "ada").unwrap();
        assert!(verify_token("other-secret", &token).is_err());
    }
}
