//! User administration endpoints.
//!
//! Registration and login live in [`super::auth`]; this module covers the
//! directory (list/get) and account maintenance. Users may edit their own
//! account; staff may edit anyone. Role changes are reserved for staff so a
//! user cannot grant themselves an override, and deletion is limited to the
//! account holder or a `Staff-Admin`.

use axum::{
    Json,
    extract::{Extension, Path},
    http::HeaderMap,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use utoipa::ToSchema;

use super::auth::types::MessageResponse;
use super::auth::utils::{
    BCRYPT_COST, is_unique_violation, normalize_email, valid_email, valid_password, valid_username,
};
use super::auth::{Role, require_auth};
use crate::api::error::{ApiError, FieldError};
use anyhow::Context;

/// Typed patch for account maintenance; the password is re-hashed when set.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    #[schema(value_type = Option<String>)]
    pub password: Option<SecretString>,
    pub role: Option<String>,
    pub active: Option<bool>,
}

impl UserPatch {
    fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.password.is_none()
            && self.role.is_none()
            && self.active.is_none()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub created_at: String,
}

#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "List users", body = [UserResponse]),
        (status = 401, description = "Missing or invalid session"),
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    require_auth(&headers, &pool).await?;
    let rows = sqlx::query(&select_users("ORDER BY users.created_at"))
        .fetch_all(&pool.0)
        .await?;
    rows.iter().map(user_from_row).collect::<Result<_, _>>().map(Json)
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User detail", body = UserResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "User not found"),
    ),
    tag = "users"
)]
pub async fn get_user(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<UserResponse>, ApiError> {
    require_auth(&headers, &pool).await?;
    let row = sqlx::query(&select_users("WHERE users.id = $1"))
        .bind(id)
        .fetch_optional(&pool.0)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    Ok(Json(user_from_row(&row)?))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    request_body = UserPatch,
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User updated", body = MessageResponse),
        (status = 400, description = "Validation failure, empty patch, or duplicate username/email"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Not the account holder and not staff"),
        (status = 404, description = "User not found"),
    ),
    tag = "users"
)]
pub async fn update_user(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<UserPatch>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;

    let exists = sqlx::query("SELECT 1 FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool.0)
        .await?
        .is_some();
    if !exists {
        return Err(ApiError::NotFound("User not found"));
    }
    principal.require_owner_or_staff(id)?;

    let patch = payload.map(|Json(patch)| patch).unwrap_or_default();
    if patch.is_empty() {
        return Err(ApiError::BadRequest("No fields to update"));
    }

    let mut details = Vec::new();
    let username = patch.username.as_deref().map(str::trim);
    if let Some(username) = username {
        if !valid_username(username) {
            details.push(FieldError::new(
                "username",
                "Username must be 3-50 characters of letters, numbers, underscores and hyphens",
            ));
        }
    }
    let email = patch.email.as_deref().map(normalize_email);
    if let Some(email) = &email {
        if !valid_email(email) {
            details.push(FieldError::new("email", "Invalid email format"));
        }
    }
    if let Some(password) = &patch.password {
        if !valid_password(password.expose_secret()) {
            details.push(FieldError::new(
                "password",
                "Password must be at least 6 characters long",
            ));
        }
    }
    let role = match patch.role.as_deref().map(str::trim) {
        Some(value) => match Role::parse(value) {
            Some(role) => Some(role),
            None => {
                details.push(FieldError::new("role", "Invalid role"));
                None
            }
        },
        None => None,
    };
    if !details.is_empty() {
        return Err(ApiError::Validation(details));
    }

    // Role and activation changes grant or revoke authority, so they stay
    // staff-only even on one's own account.
    if (role.is_some() || patch.active.is_some()) && !principal.role.is_staff() {
        return Err(ApiError::Forbidden("Staff access required"));
    }

    let password_hash = match patch.password {
        Some(password) => {
            let password = password.expose_secret().to_string();
            let hash = tokio::task::spawn_blocking(move || bcrypt::hash(&password, BCRYPT_COST))
                .await
                .context("password hashing task failed")?
                .context("failed to hash password")?;
            Some(hash)
        }
        None => None,
    };

    let mut builder = sqlx::QueryBuilder::new("UPDATE users SET ");
    let mut fields = builder.separated(", ");
    if let Some(username) = username {
        fields.push("username = ");
        fields.push_bind_unseparated(username.to_string());
    }
    if let Some(email) = &email {
        fields.push("email = ");
        fields.push_bind_unseparated(email);
    }
    if let Some(hash) = &password_hash {
        fields.push("password_hash = ");
        fields.push_bind_unseparated(hash);
    }
    if let Some(role) = role {
        fields.push("role = ");
        fields.push_bind_unseparated(role.as_str());
    }
    if let Some(active) = patch.active {
        fields.push("active = ");
        fields.push_bind_unseparated(active);
    }
    fields.push("updated_at = NOW()");
    builder.push(" WHERE id = ");
    builder.push_bind(id);

    if let Err(err) = builder.build().execute(&pool.0).await {
        if is_unique_violation(&err) {
            return Err(ApiError::Conflict("Username or email already exists"));
        }
        return Err(err.into());
    }

    Ok(Json(MessageResponse {
        message: "User updated successfully".to_string(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Not the account holder and not a Staff-Admin"),
        (status = 404, description = "User not found"),
    ),
    tag = "users"
)]
pub async fn delete_user(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;

    let exists = sqlx::query("SELECT 1 FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool.0)
        .await?
        .is_some();
    if !exists {
        return Err(ApiError::NotFound("User not found"));
    }

    if principal.user_id != id && principal.role != Role::StaffAdmin {
        return Err(ApiError::Forbidden(
            "Only the account holder or a Staff-Admin can delete a user",
        ));
    }

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&pool.0)
        .await?;
    Ok(Json(MessageResponse {
        message: "User deleted successfully".to_string(),
    }))
}

fn select_users(suffix: &str) -> String {
    format!(
        r#"
        SELECT
            users.id,
            users.username,
            users.email,
            users.role,
            users.active,
            to_char(users.created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
        FROM users
        {suffix}
        "#
    )
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<UserResponse, ApiError> {
    let role: String = row.get("role");
    let role = Role::parse(&role)
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("unknown role in database: {role}")))?;
    Ok(UserResponse {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        role,
        active: row.get("active"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::UserPatch;

    #[test]
    fn empty_patch_detected() {
        assert!(UserPatch::default().is_empty());
        let patch = UserPatch {
            email: Some("new@example.com".to_string()),
            ..UserPatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn patch_deserializes_partial_bodies() -> anyhow::Result<()> {
        let patch: UserPatch =
            serde_json::from_value(serde_json::json!({ "role": "Staff-Supervisor" }))?;
        assert_eq!(patch.role.as_deref(), Some("Staff-Supervisor"));
        assert!(patch.password.is_none());
        Ok(())
    }
}
