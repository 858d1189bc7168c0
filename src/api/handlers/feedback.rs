//! Feedback endpoints.
//!
//! Feedback is posted against a project by the authenticated user; the
//! project reference is validated before the insert. Edits require the
//! author or a staff override.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use utoipa::ToSchema;

use super::auth::require_auth;
use super::auth::types::MessageResponse;
use crate::api::error::{ApiError, FieldError};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFeedbackRequest {
    pub comment: Option<String>,
    pub attachments: Option<String>,
    pub project_id: i64,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct FeedbackPatch {
    pub comment: Option<String>,
    pub attachments: Option<String>,
}

impl FeedbackPatch {
    fn is_empty(&self) -> bool {
        self.comment.is_none() && self.attachments.is_none()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeedbackResponse {
    pub id: i64,
    pub comment: Option<String>,
    pub attachments: Option<String>,
    pub posted_on: String,
    pub user_id: i64,
    pub username: String,
    pub project_id: i64,
    pub project_title: String,
}

#[utoipa::path(
    post,
    path = "/api/feedbacks",
    request_body = CreateFeedbackRequest,
    responses(
        (status = 201, description = "Feedback created", body = FeedbackResponse),
        (status = 400, description = "Validation failure or unknown project"),
        (status = 401, description = "Missing or invalid session"),
    ),
    tag = "feedback"
)]
pub async fn create_feedback(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<CreateFeedbackRequest>>,
) -> Result<(StatusCode, Json<FeedbackResponse>), ApiError> {
    let principal = require_auth(&headers, &pool).await?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let comment = request
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|comment| !comment.is_empty())
        .map(str::to_string);
    if comment.is_none() && request.attachments.is_none() {
        return Err(ApiError::Validation(vec![FieldError::new(
            "comment",
            "Feedback needs a comment or an attachment",
        )]));
    }

    let project_title = fetch_project_title(&pool, request.project_id)
        .await?
        .ok_or(ApiError::BadRequest("Project not found"))?;

    let query = r"
        INSERT INTO feedback (comment, attachments, user_id, project_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id, to_char(posted_on, 'YYYY-MM-DD') AS posted_on
    ";
    let row = sqlx::query(query)
        .bind(&comment)
        .bind(&request.attachments)
        .bind(principal.user_id)
        .bind(request.project_id)
        .fetch_one(&pool.0)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(FeedbackResponse {
            id: row.get("id"),
            comment,
            attachments: request.attachments,
            posted_on: row.get("posted_on"),
            user_id: principal.user_id,
            username: principal.username,
            project_id: request.project_id,
            project_title,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/feedbacks",
    responses(
        (status = 200, description = "List feedback with author and project context", body = [FeedbackResponse]),
        (status = 401, description = "Missing or invalid session"),
    ),
    tag = "feedback"
)]
pub async fn list_feedback(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<Vec<FeedbackResponse>>, ApiError> {
    require_auth(&headers, &pool).await?;
    let rows = sqlx::query(&select_feedback("ORDER BY feedback.posted_on DESC"))
        .fetch_all(&pool.0)
        .await?;
    Ok(Json(rows.iter().map(feedback_from_row).collect()))
}

#[utoipa::path(
    get,
    path = "/api/feedbacks/{id}",
    params(("id" = i64, Path, description = "Feedback id")),
    responses(
        (status = 200, description = "Feedback detail", body = FeedbackResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Feedback not found"),
    ),
    tag = "feedback"
)]
pub async fn get_feedback(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    require_auth(&headers, &pool).await?;
    let row = sqlx::query(&select_feedback("WHERE feedback.id = $1"))
        .bind(id)
        .fetch_optional(&pool.0)
        .await?
        .ok_or(ApiError::NotFound("Feedback not found"))?;
    Ok(Json(feedback_from_row(&row)))
}

#[utoipa::path(
    put,
    path = "/api/feedbacks/{id}",
    request_body = FeedbackPatch,
    params(("id" = i64, Path, description = "Feedback id")),
    responses(
        (status = 200, description = "Feedback updated", body = MessageResponse),
        (status = 400, description = "Empty patch"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Not the author and not staff"),
        (status = 404, description = "Feedback not found"),
    ),
    tag = "feedback"
)]
pub async fn update_feedback(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<FeedbackPatch>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;

    let owner_id = fetch_feedback_owner(&pool, id)
        .await?
        .ok_or(ApiError::NotFound("Feedback not found"))?;
    principal.require_owner_or_staff(owner_id)?;

    let patch = payload.map(|Json(patch)| patch).unwrap_or_default();
    if patch.is_empty() {
        return Err(ApiError::BadRequest("No fields to update"));
    }

    let mut builder = sqlx::QueryBuilder::new("UPDATE feedback SET ");
    let mut fields = builder.separated(", ");
    if let Some(comment) = &patch.comment {
        fields.push("comment = ");
        fields.push_bind_unseparated(comment.trim());
    }
    if let Some(attachments) = &patch.attachments {
        fields.push("attachments = ");
        fields.push_bind_unseparated(attachments);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.build().execute(&pool.0).await?;

    Ok(Json(MessageResponse {
        message: "Feedback updated successfully".to_string(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/feedbacks/{id}",
    params(("id" = i64, Path, description = "Feedback id")),
    responses(
        (status = 200, description = "Feedback deleted", body = MessageResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Not the author and not staff"),
        (status = 404, description = "Feedback not found"),
    ),
    tag = "feedback"
)]
pub async fn delete_feedback(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;

    let owner_id = fetch_feedback_owner(&pool, id)
        .await?
        .ok_or(ApiError::NotFound("Feedback not found"))?;
    principal.require_owner_or_staff(owner_id)?;

    sqlx::query("DELETE FROM feedback WHERE id = $1")
        .bind(id)
        .execute(&pool.0)
        .await?;
    Ok(Json(MessageResponse {
        message: "Feedback deleted successfully".to_string(),
    }))
}

fn select_feedback(suffix: &str) -> String {
    format!(
        r"
        SELECT
            feedback.id,
            feedback.comment,
            feedback.attachments,
            to_char(feedback.posted_on, 'YYYY-MM-DD') AS posted_on,
            feedback.user_id,
            users.username,
            feedback.project_id,
            projects.title AS project_title
        FROM feedback
        JOIN users ON feedback.user_id = users.id
        JOIN projects ON feedback.project_id = projects.id
        {suffix}
        "
    )
}

fn feedback_from_row(row: &sqlx::postgres::PgRow) -> FeedbackResponse {
    FeedbackResponse {
        id: row.get("id"),
        comment: row.get("comment"),
        attachments: row.get("attachments"),
        posted_on: row.get("posted_on"),
        user_id: row.get("user_id"),
        username: row.get("username"),
        project_id: row.get("project_id"),
        project_title: row.get("project_title"),
    }
}

async fn fetch_feedback_owner(pool: &PgPool, id: i64) -> Result<Option<i64>, ApiError> {
    let row = sqlx::query("SELECT user_id FROM feedback WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get("user_id")))
}

async fn fetch_project_title(pool: &PgPool, id: i64) -> Result<Option<String>, ApiError> {
    let row = sqlx::query("SELECT title FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get("title")))
}

#[cfg(test)]
mod tests {
    use super::FeedbackPatch;

    #[test]
    fn empty_patch_detected() {
        assert!(FeedbackPatch::default().is_empty());
        let patch = FeedbackPatch {
            comment: Some("revised".to_string()),
            attachments: None,
        };
        assert!(!patch.is_empty());
    }
}
