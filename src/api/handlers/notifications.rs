//! Notification endpoints. Staff publish notifications addressed to a user.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use utoipa::ToSchema;

use super::auth::require_auth;
use super::auth::types::MessageResponse;
use crate::api::error::{ApiError, FieldError};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNotificationRequest {
    pub message: String,
    pub user_id: i64,
    #[schema(value_type = Option<String>, format = Date)]
    pub notified_on: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct NotificationPatch {
    pub message: Option<String>,
    #[schema(value_type = Option<String>, format = Date)]
    pub notified_on: Option<NaiveDate>,
    pub user_id: Option<i64>,
}

impl NotificationPatch {
    fn is_empty(&self) -> bool {
        self.message.is_none() && self.notified_on.is_none() && self.user_id.is_none()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationResponse {
    pub id: i64,
    pub message: String,
    pub notified_on: String,
    pub user_id: i64,
    pub username: String,
}

#[utoipa::path(
    post,
    path = "/api/notifications",
    request_body = CreateNotificationRequest,
    responses(
        (status = 201, description = "Notification created", body = NotificationResponse),
        (status = 400, description = "Validation failure or unknown user"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Staff access required"),
    ),
    tag = "notifications"
)]
pub async fn create_notification(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<CreateNotificationRequest>>,
) -> Result<(StatusCode, Json<NotificationResponse>), ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    principal.require_staff()?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let message = request.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::Validation(vec![FieldError::new(
            "message",
            "Message is required",
        )]));
    }

    let username = fetch_username(&pool, request.user_id)
        .await?
        .ok_or(ApiError::BadRequest("User not found"))?;

    let query = r"
        INSERT INTO notifications (message, notified_on, user_id)
        VALUES ($1, COALESCE($2, CURRENT_DATE), $3)
        RETURNING id, to_char(notified_on, 'YYYY-MM-DD') AS notified_on
    ";
    let row = sqlx::query(query)
        .bind(&message)
        .bind(request.notified_on)
        .bind(request.user_id)
        .fetch_one(&pool.0)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(NotificationResponse {
            id: row.get("id"),
            message,
            notified_on: row.get("notified_on"),
            user_id: request.user_id,
            username,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/notifications",
    responses(
        (status = 200, description = "List notifications", body = [NotificationResponse]),
        (status = 401, description = "Missing or invalid session"),
    ),
    tag = "notifications"
)]
pub async fn list_notifications(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<Vec<NotificationResponse>>, ApiError> {
    require_auth(&headers, &pool).await?;
    let rows = sqlx::query(&select_notifications("ORDER BY notifications.notified_on DESC"))
        .fetch_all(&pool.0)
        .await?;
    Ok(Json(rows.iter().map(notification_from_row).collect()))
}

#[utoipa::path(
    get,
    path = "/api/notifications/{id}",
    params(("id" = i64, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification detail", body = NotificationResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Notification not found"),
    ),
    tag = "notifications"
)]
pub async fn get_notification(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<NotificationResponse>, ApiError> {
    require_auth(&headers, &pool).await?;
    let row = sqlx::query(&select_notifications("WHERE notifications.id = $1"))
        .bind(id)
        .fetch_optional(&pool.0)
        .await?
        .ok_or(ApiError::NotFound("Notification not found"))?;
    Ok(Json(notification_from_row(&row)))
}

#[utoipa::path(
    put,
    path = "/api/notifications/{id}",
    request_body = NotificationPatch,
    params(("id" = i64, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification updated", body = MessageResponse),
        (status = 400, description = "Empty patch or unknown user"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Staff access required"),
        (status = 404, description = "Notification not found"),
    ),
    tag = "notifications"
)]
pub async fn update_notification(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<NotificationPatch>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    principal.require_staff()?;

    let patch = payload.map(|Json(patch)| patch).unwrap_or_default();
    if patch.is_empty() {
        return Err(ApiError::BadRequest("No fields to update"));
    }

    if let Some(user_id) = patch.user_id {
        if fetch_username(&pool, user_id).await?.is_none() {
            return Err(ApiError::BadRequest("User not found"));
        }
    }

    let mut builder = sqlx::QueryBuilder::new("UPDATE notifications SET ");
    let mut fields = builder.separated(", ");
    if let Some(message) = &patch.message {
        fields.push("message = ");
        fields.push_bind_unseparated(message.trim());
    }
    if let Some(notified_on) = patch.notified_on {
        fields.push("notified_on = ");
        fields.push_bind_unseparated(notified_on);
    }
    if let Some(user_id) = patch.user_id {
        fields.push("user_id = ");
        fields.push_bind_unseparated(user_id);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    let updated = builder.build().execute(&pool.0).await?.rows_affected();

    if updated == 0 {
        return Err(ApiError::NotFound("Notification not found"));
    }
    Ok(Json(MessageResponse {
        message: "Notification updated successfully".to_string(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/notifications/{id}",
    params(("id" = i64, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification deleted", body = MessageResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Staff access required"),
        (status = 404, description = "Notification not found"),
    ),
    tag = "notifications"
)]
pub async fn delete_notification(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    principal.require_staff()?;

    let deleted = sqlx::query("DELETE FROM notifications WHERE id = $1")
        .bind(id)
        .execute(&pool.0)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(ApiError::NotFound("Notification not found"));
    }
    Ok(Json(MessageResponse {
        message: "Notification deleted successfully".to_string(),
    }))
}

fn select_notifications(suffix: &str) -> String {
    format!(
        r"
        SELECT
            notifications.id,
            notifications.message,
            to_char(notifications.notified_on, 'YYYY-MM-DD') AS notified_on,
            notifications.user_id,
            users.username
        FROM notifications
        JOIN users ON notifications.user_id = users.id
        {suffix}
        "
    )
}

fn notification_from_row(row: &sqlx::postgres::PgRow) -> NotificationResponse {
    NotificationResponse {
        id: row.get("id"),
        message: row.get("message"),
        notified_on: row.get("notified_on"),
        user_id: row.get("user_id"),
        username: row.get("username"),
    }
}

async fn fetch_username(pool: &PgPool, id: i64) -> Result<Option<String>, ApiError> {
    let row = sqlx::query("SELECT username FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get("username")))
}

#[cfg(test)]
mod tests {
    use super::NotificationPatch;

    #[test]
    fn empty_patch_detected() {
        assert!(NotificationPatch::default().is_empty());
        let patch = NotificationPatch {
            message: Some("updated".to_string()),
            ..NotificationPatch::default()
        };
        assert!(!patch.is_empty());
    }
}
