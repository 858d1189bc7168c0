//! Idea endpoints.
//!
//! Ideas are submitted by community members and carry their author. Creation
//! is restricted to the `Community` role; updates and deletes require the
//! owner or a staff override. Reads are open to any authenticated user.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use utoipa::ToSchema;

use super::auth::types::MessageResponse;
use super::auth::{Role, require_auth};
use super::{valid_description, valid_title};
use crate::api::error::{ApiError, FieldError};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateIdeaRequest {
    pub title: String,
    pub description: String,
}

/// Typed patch: absent fields are left untouched by the update statement.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct IdeaPatch {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl IdeaPatch {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IdeaResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub created_at: String,
    pub updated_at: String,
}

#[utoipa::path(
    post,
    path = "/api/ideas",
    request_body = CreateIdeaRequest,
    responses(
        (status = 201, description = "Idea created", body = IdeaResponse),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Only Community users can create ideas"),
    ),
    tag = "ideas"
)]
pub async fn create_idea(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<CreateIdeaRequest>>,
) -> Result<(StatusCode, Json<IdeaResponse>), ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    principal.require_role(&[Role::Community])?;

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

    let idea = insert_idea(&pool, &title, &description, &principal).await?;
    Ok((StatusCode::CREATED, Json(idea)))
}

#[utoipa::path(
    get,
    path = "/api/ideas",
    responses(
        (status = 200, description = "List ideas with their authors", body = [IdeaResponse]),
        (status = 401, description = "Missing or invalid session"),
    ),
    tag = "ideas"
)]
pub async fn list_ideas(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<Vec<IdeaResponse>>, ApiError> {
    require_auth(&headers, &pool).await?;
    let ideas = fetch_ideas(&pool).await?;
    Ok(Json(ideas))
}

#[utoipa::path(
    get,
    path = "/api/ideas/{id}",
    params(("id" = i64, Path, description = "Idea id")),
    responses(
        (status = 200, description = "Idea detail", body = IdeaResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Idea not found"),
    ),
    tag = "ideas"
)]
pub async fn get_idea(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<IdeaResponse>, ApiError> {
    require_auth(&headers, &pool).await?;
    let idea = fetch_idea(&pool, id)
        .await?
        .ok_or(ApiError::NotFound("Idea not found"))?;
    Ok(Json(idea))
}

#[utoipa::path(
    put,
    path = "/api/ideas/{id}",
    request_body = IdeaPatch,
    params(("id" = i64, Path, description = "Idea id")),
    responses(
        (status = 200, description = "Idea updated", body = MessageResponse),
        (status = 400, description = "Validation failure or empty patch"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Not the owner and not staff"),
        (status = 404, description = "Idea not found"),
    ),
    tag = "ideas"
)]
pub async fn update_idea(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<IdeaPatch>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;

    // Existence first: an unknown id is 404 before ownership is considered.
    let owner_id = fetch_idea_owner(&pool, id)
        .await?
        .ok_or(ApiError::NotFound("Idea not found"))?;
    principal.require_owner_or_staff(owner_id)?;

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

    apply_idea_patch(&pool, id, &patch).await?;
    Ok(Json(MessageResponse {
        message: "Idea updated successfully".to_string(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/ideas/{id}",
    params(("id" = i64, Path, description = "Idea id")),
    responses(
        (status = 200, description = "Idea deleted", body = MessageResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Not the owner and not staff"),
        (status = 404, description = "Idea not found"),
    ),
    tag = "ideas"
)]
pub async fn delete_idea(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;

    let owner_id = fetch_idea_owner(&pool, id)
        .await?
        .ok_or(ApiError::NotFound("Idea not found"))?;
    principal.require_owner_or_staff(owner_id)?;

    let deleted = sqlx::query("DELETE FROM ideas WHERE id = $1")
        .bind(id)
        .execute(&pool.0)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(ApiError::NotFound("Idea not found"));
    }
    Ok(Json(MessageResponse {
        message: "Idea deleted successfully".to_string(),
    }))
}

const IDEA_COLUMNS: &str = r#"
    ideas.id,
    ideas.title,
    ideas.description,
    ideas.user_id,
    users.username,
    users.role,
    to_char(ideas.created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
    to_char(ideas.updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
"#;

fn idea_from_row(row: &sqlx::postgres::PgRow) -> Result<IdeaResponse, ApiError> {
    let role: String = row.get("role");
    let role = Role::parse(&role)
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("unknown role in database: {role}")))?;
    Ok(IdeaResponse {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        user_id: row.get("user_id"),
        username: row.get("username"),
        role,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

async fn insert_idea(
    pool: &PgPool,
    title: &str,
    description: &str,
    principal: &super::auth::Principal,
) -> Result<IdeaResponse, ApiError> {
    let query = r#"
        INSERT INTO ideas (title, description, user_id)
        VALUES ($1, $2, $3)
        RETURNING id,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
    "#;
    let row = sqlx::query(query)
        .bind(title)
        .bind(description)
        .bind(principal.user_id)
        .fetch_one(pool)
        .await?;

    Ok(IdeaResponse {
        id: row.get("id"),
        title: title.to_string(),
        description: description.to_string(),
        user_id: principal.user_id,
        username: principal.username.clone(),
        role: principal.role,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

async fn fetch_ideas(pool: &PgPool) -> Result<Vec<IdeaResponse>, ApiError> {
    let query = format!(
        "SELECT {IDEA_COLUMNS} FROM ideas JOIN users ON ideas.user_id = users.id ORDER BY ideas.created_at DESC"
    );
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    rows.iter().map(idea_from_row).collect()
}

async fn fetch_idea(pool: &PgPool, id: i64) -> Result<Option<IdeaResponse>, ApiError> {
    let query = format!(
        "SELECT {IDEA_COLUMNS} FROM ideas JOIN users ON ideas.user_id = users.id WHERE ideas.id = $1"
    );
    let row = sqlx::query(&query).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(idea_from_row).transpose()
}

async fn fetch_idea_owner(pool: &PgPool, id: i64) -> Result<Option<i64>, ApiError> {
    let row = sqlx::query("SELECT user_id FROM ideas WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get("user_id")))
}

/// Translate the typed patch into one parameterized UPDATE.
async fn apply_idea_patch(pool: &PgPool, id: i64, patch: &IdeaPatch) -> Result<(), ApiError> {
    let mut builder = sqlx::QueryBuilder::new("UPDATE ideas SET ");
    let mut fields = builder.separated(", ");
    if let Some(title) = &patch.title {
        fields.push("title = ");
        fields.push_bind_unseparated(title.trim());
    }
    if let Some(description) = &patch.description {
        fields.push("description = ");
        fields.push_bind_unseparated(description.trim());
    }
    fields.push("updated_at = NOW()");
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.build().execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::IdeaPatch;

    #[test]
    fn empty_patch_detected() {
        assert!(IdeaPatch::default().is_empty());
        let patch = IdeaPatch {
            title: Some("New title".to_string()),
            description: None,
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn patch_deserializes_partial_bodies() -> anyhow::Result<()> {
        let patch: IdeaPatch =
            serde_json::from_value(serde_json::json!({ "description": "a better description" }))?;
        assert!(patch.title.is_none());
        assert_eq!(patch.description.as_deref(), Some("a better description"));
        Ok(())
    }
}
