//! Course endpoints. Courses are reference data managed by staff.

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
pub struct CreateCourseRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CoursePatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl CoursePatch {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CourseResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/courses",
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Course created", body = CourseResponse),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Staff access required"),
    ),
    tag = "courses"
)]
pub async fn create_course(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<CreateCourseRequest>>,
) -> Result<(StatusCode, Json<CourseResponse>), ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    principal.require_staff()?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::BadRequest("Missing payload"));
    };

    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation(vec![FieldError::new(
            "name",
            "Name is required",
        )]));
    }

    let row = sqlx::query("INSERT INTO courses (name, description) VALUES ($1, $2) RETURNING id")
        .bind(&name)
        .bind(&request.description)
        .fetch_one(&pool.0)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CourseResponse {
            id: row.get("id"),
            name,
            description: request.description,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/courses",
    responses(
        (status = 200, description = "List courses", body = [CourseResponse]),
        (status = 401, description = "Missing or invalid session"),
    ),
    tag = "courses"
)]
pub async fn list_courses(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<Vec<CourseResponse>>, ApiError> {
    require_auth(&headers, &pool).await?;
    let rows = sqlx::query("SELECT id, name, description FROM courses ORDER BY name")
        .fetch_all(&pool.0)
        .await?;
    let courses = rows
        .into_iter()
        .map(|row| CourseResponse {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
        })
        .collect();
    Ok(Json(courses))
}

#[utoipa::path(
    get,
    path = "/api/courses/{id}",
    params(("id" = i64, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course detail", body = CourseResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Course not found"),
    ),
    tag = "courses"
)]
pub async fn get_course(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<CourseResponse>, ApiError> {
    require_auth(&headers, &pool).await?;
    let row = sqlx::query("SELECT id, name, description FROM courses WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool.0)
        .await?
        .ok_or(ApiError::NotFound("Course not found"))?;
    Ok(Json(CourseResponse {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
    }))
}

#[utoipa::path(
    put,
    path = "/api/courses/{id}",
    request_body = CoursePatch,
    params(("id" = i64, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course updated", body = MessageResponse),
        (status = 400, description = "Empty patch"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Staff access required"),
        (status = 404, description = "Course not found"),
    ),
    tag = "courses"
)]
pub async fn update_course(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<CoursePatch>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    principal.require_staff()?;

    let patch = payload.map(|Json(patch)| patch).unwrap_or_default();
    if patch.is_empty() {
        return Err(ApiError::BadRequest("No fields to update"));
    }
    if let Some(name) = &patch.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation(vec![FieldError::new(
                "name",
                "Name is required",
            )]));
        }
    }

    let mut builder = sqlx::QueryBuilder::new("UPDATE courses SET ");
    let mut fields = builder.separated(", ");
    if let Some(name) = &patch.name {
        fields.push("name = ");
        fields.push_bind_unseparated(name.trim());
    }
    if let Some(description) = &patch.description {
        fields.push("description = ");
        fields.push_bind_unseparated(description);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    let updated = builder.build().execute(&pool.0).await?.rows_affected();

    if updated == 0 {
        return Err(ApiError::NotFound("Course not found"));
    }
    Ok(Json(MessageResponse {
        message: "Course updated successfully".to_string(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/courses/{id}",
    params(("id" = i64, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course deleted", body = MessageResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Staff access required"),
        (status = 404, description = "Course not found"),
    ),
    tag = "courses"
)]
pub async fn delete_course(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    principal.require_staff()?;

    let deleted = sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(id)
        .execute(&pool.0)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(ApiError::NotFound("Course not found"));
    }
    Ok(Json(MessageResponse {
        message: "Course deleted successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::CoursePatch;

    #[test]
    fn empty_patch_detected() {
        assert!(CoursePatch::default().is_empty());
        let patch = CoursePatch {
            name: None,
            description: Some("updated".to_string()),
        };
        assert!(!patch.is_empty());
    }
}
