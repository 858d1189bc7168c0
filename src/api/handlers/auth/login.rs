//! Registration and login endpoints.

use anyhow::Context;
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info};

use super::lockout::{self, FailureOutcome, LockoutState};
use super::session::session_cookie;
use super::state::AuthConfig;
use super::storage::{CredentialRecord, RegisterOutcome, insert_session, insert_user, lookup_credentials};
use super::types::{
    LoginRejection, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, Role,
    UserSummary,
};
use super::utils::{
    BCRYPT_COST, burn_password_verification, normalize_email, valid_email, valid_password,
    valid_username,
};
use crate::api::error::{ApiError, FieldError};

#[utoipa::path(
    post,
    path = "/api/users/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Validation failure or duplicate username/email"),
        (status = 500, description = "Internal error")
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let username = request.username.trim().to_string();
    let email = normalize_email(&request.email);
    let password = request.password.expose_secret().to_string();

    let mut details = Vec::new();
    if !valid_username(&username) {
        details.push(FieldError::new(
            "username",
            "Username must be 3-50 characters of letters, numbers, underscores and hyphens",
        ));
    }
    if !valid_email(&email) {
        details.push(FieldError::new("email", "Invalid email format"));
    }
    if !valid_password(&password) {
        details.push(FieldError::new(
            "password",
            "Password must be at least 6 characters long",
        ));
    }
    let role = Role::parse(request.role.trim());
    if role.is_none() {
        details.push(FieldError::new("role", "Invalid role"));
    }
    if !details.is_empty() {
        return Err(ApiError::Validation(details));
    }
    let Some(role) = role else {
        return Err(ApiError::BadRequest("Invalid role"));
    };

    let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(&password, BCRYPT_COST))
        .await
        .context("password hashing task failed")?
        .context("failed to hash password")?;

    match insert_user(&pool, &username, &email, &password_hash, role).await? {
        RegisterOutcome::Created { user_id } => {
            info!(username, "user registered");
            let response = RegisterResponse {
                message: "User registered successfully".to_string(),
                user_id,
            };
            Ok((StatusCode::CREATED, Json(response)).into_response())
        }
        RegisterOutcome::Conflict => Err(ApiError::Conflict("Username or email already exists")),
    }
}

#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = LoginRejection),
        (status = 403, description = "Account locked"),
        (status = 500, description = "Internal error")
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_config: Extension<Arc<AuthConfig>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let username = request.username.trim().to_string();
    let password = request.password.expose_secret().to_string();

    let mut details = Vec::new();
    if username.is_empty() {
        details.push(FieldError::new("username", "Username is required"));
    }
    if password.is_empty() {
        details.push(FieldError::new("password", "Password is required"));
    }
    if !details.is_empty() {
        return Err(ApiError::Validation(details));
    }

    // Lockout gate runs before any credential work; the only write it may
    // perform is clearing an already-expired lock.
    if let LockoutState::Locked { remaining_minutes } = lockout::check(&pool, &username).await? {
        debug!(username, remaining_minutes, "login refused while locked");
        return Err(ApiError::Locked { remaining_minutes });
    }

    let record = lookup_credentials(&pool, &username).await?;

    let Some(CredentialRecord {
        user_id,
        username,
        email,
        role,
        password_hash,
        active,
    }) = record
    else {
        // Unknown account: burn a comparable-cost verification so timing does
        // not reveal whether the username exists, then answer exactly like a
        // wrong password. There is no row to count the failure against.
        tokio::task::spawn_blocking(move || burn_password_verification(&password))
            .await
            .context("dummy verification task failed")?;
        return Ok(invalid_credentials(None));
    };

    if !active {
        // Disabled accounts are indistinguishable from unknown ones.
        tokio::task::spawn_blocking(move || burn_password_verification(&password))
            .await
            .context("dummy verification task failed")?;
        return Ok(invalid_credentials(None));
    }

    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(&password, &password_hash))
        .await
        .context("password verification task failed")?
        .context("failed to verify password")?;

    if !verified {
        return match lockout::record_failure(&pool, user_id).await? {
            FailureOutcome::Locked { remaining_minutes } => {
                debug!(username, "account locked after repeated failures");
                Err(ApiError::Locked { remaining_minutes })
            }
            FailureOutcome::Remaining { attempts } => Ok(invalid_credentials(Some(attempts))),
        };
    }

    lockout::record_success(&pool, user_id).await?;

    let session = insert_session(&pool, user_id, auth_config.session_ttl_seconds()).await?;
    let cookie = session_cookie(&auth_config, &session.token)
        .context("failed to build session cookie")?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    info!(username, "login successful");
    let response = LoginResponse {
        message: "Login successful".to_string(),
        user: UserSummary {
            id: user_id,
            username,
            email,
            role,
        },
        csrf_token: session.csrf_token,
    };
    Ok((StatusCode::OK, headers, Json(response)).into_response())
}

fn invalid_credentials(attempts_remaining: Option<i32>) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(LoginRejection {
            error: "Invalid credentials",
            attempts_remaining,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn register_missing_payload() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let result = register(Extension(pool), None).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_invalid_fields() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let request = RegisterRequest {
            username: "a".to_string(),
            email: "not-an-email".to_string(),
            password: "short".to_string().into(),
            role: "Wizard".to_string(),
        };
        let result = register(Extension(pool), Some(Json(request))).await;
        let Err(ApiError::Validation(details)) = result else {
            anyhow::bail!("expected validation failure");
        };
        let fields: Vec<&str> = details.iter().map(|d| d.field).collect();
        assert_eq!(fields, vec!["username", "email", "password", "role"]);
        Ok(())
    }

    #[tokio::test]
    async fn login_missing_payload() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let config = Arc::new(AuthConfig::new("http://localhost:3000".to_string()));
        let result = login(Extension(pool), Extension(config), None).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        Ok(())
    }

    #[tokio::test]
    async fn login_requires_username_and_password() -> anyhow::Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let config = Arc::new(AuthConfig::new("http://localhost:3000".to_string()));
        let request = LoginRequest {
            username: "  ".to_string(),
            password: String::new().into(),
        };
        let result = login(Extension(pool), Extension(config), Some(Json(request))).await;
        let Err(ApiError::Validation(details)) = result else {
            anyhow::bail!("expected validation failure");
        };
        assert_eq!(details.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_credentials_body_shape() -> anyhow::Result<()> {
        let response = invalid_credentials(Some(2));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = to_bytes(response.into_body(), 1024).await?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(value["error"], "Invalid credentials");
        assert_eq!(value["attemptsRemaining"], 2);
        Ok(())
    }
}
