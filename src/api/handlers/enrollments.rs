//! Project-student enrollment endpoints.
//!
//! Enrollments link a student to a project. Both references are validated
//! before any write; duplicates are allowed to match the historical data
//! model, which carried no uniqueness constraint.

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
use crate::api::error::ApiError;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEnrollmentRequest {
    pub project_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct EnrollmentPatch {
    pub project_id: Option<i64>,
    pub user_id: Option<i64>,
}

impl EnrollmentPatch {
    fn is_empty(&self) -> bool {
        self.project_id.is_none() && self.user_id.is_none()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnrollmentResponse {
    pub id: i64,
    pub project_id: i64,
    pub project_title: String,
    pub user_id: i64,
    pub username: String,
}

#[utoipa::path(
    post,
    path = "/api/project-students",
    request_body = CreateEnrollmentRequest,
    responses(
        (status = 201, description = "Enrollment created", body = EnrollmentResponse),
        (status = 400, description = "Unknown project or user"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Staff access required"),
    ),
    tag = "enrollments"
)]
pub async fn create_enrollment(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<CreateEnrollmentRequest>>,
) -> Result<(StatusCode, Json<EnrollmentResponse>), ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    principal.require_staff()?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let (project_title, username) =
        validate_references(&pool, Some(request.project_id), Some(request.user_id)).await?;
    let project_title = project_title.unwrap_or_default();
    let username = username.unwrap_or_default();

    let row = sqlx::query(
        "INSERT INTO project_students (project_id, user_id) VALUES ($1, $2) RETURNING id",
    )
    .bind(request.project_id)
    .bind(request.user_id)
    .fetch_one(&pool.0)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(EnrollmentResponse {
            id: row.get("id"),
            project_id: request.project_id,
            project_title,
            user_id: request.user_id,
            username,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/project-students",
    responses(
        (status = 200, description = "List enrollments", body = [EnrollmentResponse]),
        (status = 401, description = "Missing or invalid session"),
    ),
    tag = "enrollments"
)]
pub async fn list_enrollments(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<Vec<EnrollmentResponse>>, ApiError> {
    require_auth(&headers, &pool).await?;
    let rows = sqlx::query(&select_enrollments("ORDER BY project_students.id"))
        .fetch_all(&pool.0)
        .await?;
    Ok(Json(rows.iter().map(enrollment_from_row).collect()))
}

#[utoipa::path(
    get,
    path = "/api/project-students/{id}",
    params(("id" = i64, Path, description = "Enrollment id")),
    responses(
        (status = 200, description = "Enrollment detail", body = EnrollmentResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Enrollment not found"),
    ),
    tag = "enrollments"
)]
pub async fn get_enrollment(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<EnrollmentResponse>, ApiError> {
    require_auth(&headers, &pool).await?;
    let row = sqlx::query(&select_enrollments("WHERE project_students.id = $1"))
        .bind(id)
        .fetch_optional(&pool.0)
        .await?
        .ok_or(ApiError::NotFound("Enrollment not found"))?;
    Ok(Json(enrollment_from_row(&row)))
}

#[utoipa::path(
    put,
    path = "/api/project-students/{id}",
    request_body = EnrollmentPatch,
    params(("id" = i64, Path, description = "Enrollment id")),
    responses(
        (status = 200, description = "Enrollment updated", body = MessageResponse),
        (status = 400, description = "Empty patch or unknown project/user"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Staff access required"),
        (status = 404, description = "Enrollment not found"),
    ),
    tag = "enrollments"
)]
pub async fn update_enrollment(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<EnrollmentPatch>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    principal.require_staff()?;

    let patch = payload.map(|Json(patch)| patch).unwrap_or_default();
    if patch.is_empty() {
        return Err(ApiError::BadRequest("No fields to update"));
    }

    validate_references(&pool, patch.project_id, patch.user_id).await?;

    let mut builder = sqlx::QueryBuilder::new("UPDATE project_students SET ");
    let mut fields = builder.separated(", ");
    if let Some(project_id) = patch.project_id {
        fields.push("project_id = ");
        fields.push_bind_unseparated(project_id);
    }
    if let Some(user_id) = patch.user_id {
        fields.push("user_id = ");
        fields.push_bind_unseparated(user_id);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    let updated = builder.build().execute(&pool.0).await?.rows_affected();

    if updated == 0 {
        return Err(ApiError::NotFound("Enrollment not found"));
    }
    Ok(Json(MessageResponse {
        message: "Enrollment updated successfully".to_string(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/project-students/{id}",
    params(("id" = i64, Path, description = "Enrollment id")),
    responses(
        (status = 200, description = "Enrollment deleted", body = MessageResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Staff access required"),
        (status = 404, description = "Enrollment not found"),
    ),
    tag = "enrollments"
)]
pub async fn delete_enrollment(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    principal.require_staff()?;

    let deleted = sqlx::query("DELETE FROM project_students WHERE id = $1")
        .bind(id)
        .execute(&pool.0)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(ApiError::NotFound("Enrollment not found"));
    }
    Ok(Json(MessageResponse {
        message: "Enrollment deleted successfully".to_string(),
    }))
}

/// Sequential existence pipeline; returns the display columns so create can
/// echo them without a second round trip.
async fn validate_references(
    pool: &PgPool,
    project_id: Option<i64>,
    user_id: Option<i64>,
) -> Result<(Option<String>, Option<String>), ApiError> {
    let mut project_title = None;
    if let Some(project_id) = project_id {
        let row = sqlx::query("SELECT title FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(pool)
            .await?
            .ok_or(ApiError::BadRequest("Project not found"))?;
        project_title = Some(row.get("title"));
    }

    let mut username = None;
    if let Some(user_id) = user_id {
        let row = sqlx::query("SELECT username FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or(ApiError::BadRequest("User not found"))?;
        username = Some(row.get("username"));
    }

    Ok((project_title, username))
}

fn select_enrollments(suffix: &str) -> String {
    format!(
        r"
        SELECT
            project_students.id,
            project_students.project_id,
            projects.title AS project_title,
            project_students.user_id,
            users.username
        FROM project_students
        JOIN projects ON project_students.project_id = projects.id
        JOIN users ON project_students.user_id = users.id
        {suffix}
        "
    )
}

fn enrollment_from_row(row: &sqlx::postgres::PgRow) -> EnrollmentResponse {
    EnrollmentResponse {
        id: row.get("id"),
        project_id: row.get("project_id"),
        project_title: row.get("project_title"),
        user_id: row.get("user_id"),
        username: row.get("username"),
    }
}

#[cfg(test)]
mod tests {
    use super::EnrollmentPatch;

    #[test]
    fn empty_patch_detected() {
        assert!(EnrollmentPatch::default().is_empty());
        let patch = EnrollmentPatch {
            project_id: Some(1),
            user_id: None,
        };
        assert!(!patch.is_empty());
    }
}
