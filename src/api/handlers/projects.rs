//! Project endpoints.
//!
//! Projects are created by staff from an accepted proposal and are tied to a
//! course. Both references are validated before any write; a dangling id is a
//! business-rule failure (400), distinct from a missing project (404).

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
use super::{valid_description, valid_title};
use crate::api::error::{ApiError, FieldError};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    pub title: String,
    pub description: String,
    #[schema(value_type = Option<String>, format = Date)]
    pub deadline: Option<NaiveDate>,
    pub status: Option<String>,
    pub course_id: i64,
    pub proposal_id: i64,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, format = Date)]
    pub deadline: Option<NaiveDate>,
    pub status: Option<String>,
    pub course_id: Option<i64>,
    pub proposal_id: Option<i64>,
}

impl ProjectPatch {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.deadline.is_none()
            && self.status.is_none()
            && self.course_id.is_none()
            && self.proposal_id.is_none()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub deadline: Option<String>,
    pub status: String,
    pub course_id: i64,
    pub course_name: String,
    pub proposal_id: i64,
    pub proposal_title: String,
    pub created_at: String,
}

const DEFAULT_STATUS: &str = "planned";

#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 400, description = "Validation failure or unknown course/proposal"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Only staff can create projects"),
    ),
    tag = "projects"
)]
pub async fn create_project(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<CreateProjectRequest>>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    principal.require_staff()?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let title = request.title.trim().to_string();
    let description = request.description.trim().to_string();
    let mut details = Vec::new();
    if !valid_title(&title) {
        details.push(FieldError::new(
            "title",
            "Title must be between 3 and 200 characters",
        ));
    }
    if !valid_description(&description) {
        details.push(FieldError::new(
            "description",
            "Description must be at least 10 characters long",
        ));
    }
    if !details.is_empty() {
        return Err(ApiError::Validation(details));
    }

    // Check-then-write: both references must resolve before the insert runs.
    validate_references(&pool, Some(request.course_id), Some(request.proposal_id)).await?;

    let status = request
        .status
        .as_deref()
        .map(str::trim)
        .filter(|status| !status.is_empty())
        .unwrap_or(DEFAULT_STATUS)
        .to_string();

    let query = r"
        INSERT INTO projects (title, description, deadline, status, course_id, proposal_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
    ";
    let row = sqlx::query(query)
        .bind(&title)
        .bind(&description)
        .bind(request.deadline)
        .bind(&status)
        .bind(request.course_id)
        .bind(request.proposal_id)
        .fetch_one(&pool.0)
        .await?;
    let id: i64 = row.get("id");

    let project = fetch_project(&pool, id)
        .await?
        .ok_or(ApiError::NotFound("Project not found"))?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/api/projects",
    responses(
        (status = 200, description = "List projects with course and proposal context", body = [ProjectResponse]),
        (status = 401, description = "Missing or invalid session"),
    ),
    tag = "projects"
)]
pub async fn list_projects(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<Vec<ProjectResponse>>, ApiError> {
    require_auth(&headers, &pool).await?;
    let rows = sqlx::query(&select_projects("ORDER BY projects.created_at DESC"))
        .fetch_all(&pool.0)
        .await?;
    Ok(Json(rows.iter().map(project_from_row).collect()))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    params(("id" = i64, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project detail", body = ProjectResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Project not found"),
    ),
    tag = "projects"
)]
pub async fn get_project(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<ProjectResponse>, ApiError> {
    require_auth(&headers, &pool).await?;
    let project = fetch_project(&pool, id)
        .await?
        .ok_or(ApiError::NotFound("Project not found"))?;
    Ok(Json(project))
}

#[utoipa::path(
    put,
    path = "/api/projects/{id}",
    request_body = ProjectPatch,
    params(("id" = i64, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project updated", body = MessageResponse),
        (status = 400, description = "Validation failure, empty patch, or unknown course/proposal"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Only staff can update projects"),
        (status = 404, description = "Project not found"),
    ),
    tag = "projects"
)]
pub async fn update_project(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<ProjectPatch>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    principal.require_staff()?;

    let exists = sqlx::query("SELECT 1 FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool.0)
        .await?
        .is_some();
    if !exists {
        return Err(ApiError::NotFound("Project not found"));
    }

    let patch = payload.map(|Json(patch)| patch).unwrap_or_default();
    if patch.is_empty() {
        return Err(ApiError::BadRequest("No fields to update"));
    }

    let mut details = Vec::new();
    if let Some(title) = &patch.title {
        if !valid_title(title) {
            details.push(FieldError::new(
                "title",
                "Title must be between 3 and 200 characters",
            ));
        }
    }
    if let Some(description) = &patch.description {
        if !valid_description(description) {
            details.push(FieldError::new(
                "description",
                "Description must be at least 10 characters long",
            ));
        }
    }
    if !details.is_empty() {
        return Err(ApiError::Validation(details));
    }

    validate_references(&pool, patch.course_id, patch.proposal_id).await?;

    let mut builder = sqlx::QueryBuilder::new("UPDATE projects SET ");
    let mut fields = builder.separated(", ");
    if let Some(title) = &patch.title {
        fields.push("title = ");
        fields.push_bind_unseparated(title.trim());
    }
    if let Some(description) = &patch.description {
        fields.push("description = ");
        fields.push_bind_unseparated(description.trim());
    }
    if let Some(deadline) = patch.deadline {
        fields.push("deadline = ");
        fields.push_bind_unseparated(deadline);
    }
    if let Some(status) = &patch.status {
        fields.push("status = ");
        fields.push_bind_unseparated(status.trim());
    }
    if let Some(course_id) = patch.course_id {
        fields.push("course_id = ");
        fields.push_bind_unseparated(course_id);
    }
    if let Some(proposal_id) = patch.proposal_id {
        fields.push("proposal_id = ");
        fields.push_bind_unseparated(proposal_id);
    }
    fields.push("updated_at = NOW()");
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.build().execute(&pool.0).await?;

    Ok(Json(MessageResponse {
        message: "Project updated successfully".to_string(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    params(("id" = i64, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project deleted", body = MessageResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Only staff can delete projects"),
        (status = 404, description = "Project not found"),
    ),
    tag = "projects"
)]
pub async fn delete_project(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    principal.require_staff()?;

    let deleted = sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(&pool.0)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(ApiError::NotFound("Project not found"));
    }
    Ok(Json(MessageResponse {
        message: "Project deleted successfully".to_string(),
    }))
}

/// Sequential existence pipeline for the provided references; the first
/// failing check wins and nothing is written.
async fn validate_references(
    pool: &PgPool,
    course_id: Option<i64>,
    proposal_id: Option<i64>,
) -> Result<(), ApiError> {
    if let Some(course_id) = course_id {
        let found = sqlx::query("SELECT 1 FROM courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(pool)
            .await?
            .is_some();
        if !found {
            return Err(ApiError::BadRequest("Course not found"));
        }
    }
    if let Some(proposal_id) = proposal_id {
        let found = sqlx::query("SELECT 1 FROM proposals WHERE id = $1")
            .bind(proposal_id)
            .fetch_optional(pool)
            .await?
            .is_some();
        if !found {
            return Err(ApiError::BadRequest("Proposal not found"));
        }
    }
    Ok(())
}

fn select_projects(suffix: &str) -> String {
    format!(
        r#"
        SELECT
            projects.id,
            projects.title,
            projects.description,
            to_char(projects.deadline, 'YYYY-MM-DD') AS deadline,
            projects.status,
            projects.course_id,
            courses.name AS course_name,
            projects.proposal_id,
            proposals.title AS proposal_title,
            to_char(projects.created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at
        FROM projects
        JOIN courses ON projects.course_id = courses.id
        JOIN proposals ON projects.proposal_id = proposals.id
        {suffix}
        "#
    )
}

fn project_from_row(row: &sqlx::postgres::PgRow) -> ProjectResponse {
    ProjectResponse {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        deadline: row.get("deadline"),
        status: row.get("status"),
        course_id: row.get("course_id"),
        course_name: row.get("course_name"),
        proposal_id: row.get("proposal_id"),
        proposal_title: row.get("proposal_title"),
        created_at: row.get("created_at"),
    }
}

async fn fetch_project(pool: &PgPool, id: i64) -> Result<Option<ProjectResponse>, ApiError> {
    let row = sqlx::query(&select_projects("WHERE projects.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(project_from_row))
}

#[cfg(test)]
mod tests {
    use super::ProjectPatch;

    #[test]
    fn empty_patch_detected() {
        assert!(ProjectPatch::default().is_empty());
        let patch = ProjectPatch {
            course_id: Some(2),
            ..ProjectPatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn patch_parses_dates() -> anyhow::Result<()> {
        let patch: ProjectPatch =
            serde_json::from_value(serde_json::json!({ "deadline": "2025-12-01" }))?;
        assert!(patch.deadline.is_some());
        Ok(())
    }
}
