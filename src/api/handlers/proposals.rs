//! Proposal endpoints.
//!
//! Proposals are submitted by authenticated users and owned by their creator.
//! Mutation requires the owner or a staff override; projects reference an
//! accepted proposal by id.

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
use super::{valid_description, valid_title};
use crate::api::error::{ApiError, FieldError};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProposalRequest {
    pub title: String,
    pub description: String,
    pub status: Option<String>,
    pub attachments: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProposalPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub attachments: Option<String>,
}

impl ProposalPatch {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.attachments.is_none()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProposalResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub submitted_on: String,
    pub status: String,
    pub attachments: Option<String>,
    pub user_id: i64,
    pub username: String,
}

const DEFAULT_STATUS: &str = "submitted";

#[utoipa::path(
    post,
    path = "/api/proposals",
    request_body = CreateProposalRequest,
    responses(
        (status = 201, description = "Proposal created", body = ProposalResponse),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Missing or invalid session"),
    ),
    tag = "proposals"
)]
pub async fn create_proposal(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<CreateProposalRequest>>,
) -> Result<(StatusCode, Json<ProposalResponse>), ApiError> {
    let principal = require_auth(&headers, &pool).await?;

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

    let status = request
        .status
        .as_deref()
        .map(str::trim)
        .filter(|status| !status.is_empty())
        .unwrap_or(DEFAULT_STATUS)
        .to_string();

    let query = r#"
        INSERT INTO proposals (title, description, status, attachments, user_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, to_char(submitted_on, 'YYYY-MM-DD') AS submitted_on
    "#;
    let row = sqlx::query(query)
        .bind(&title)
        .bind(&description)
        .bind(&status)
        .bind(&request.attachments)
        .bind(principal.user_id)
        .fetch_one(&pool.0)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ProposalResponse {
            id: row.get("id"),
            title,
            description,
            submitted_on: row.get("submitted_on"),
            status,
            attachments: request.attachments,
            user_id: principal.user_id,
            username: principal.username,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/proposals",
    responses(
        (status = 200, description = "List proposals with their authors", body = [ProposalResponse]),
        (status = 401, description = "Missing or invalid session"),
    ),
    tag = "proposals"
)]
pub async fn list_proposals(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<Vec<ProposalResponse>>, ApiError> {
    require_auth(&headers, &pool).await?;
    let rows = sqlx::query(&select_proposals("ORDER BY proposals.submitted_on DESC"))
        .fetch_all(&pool.0)
        .await?;
    Ok(Json(rows.iter().map(proposal_from_row).collect()))
}

#[utoipa::path(
    get,
    path = "/api/proposals/{id}",
    params(("id" = i64, Path, description = "Proposal id")),
    responses(
        (status = 200, description = "Proposal detail", body = ProposalResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Proposal not found"),
    ),
    tag = "proposals"
)]
pub async fn get_proposal(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<ProposalResponse>, ApiError> {
    require_auth(&headers, &pool).await?;
    let row = sqlx::query(&select_proposals("WHERE proposals.id = $1"))
        .bind(id)
        .fetch_optional(&pool.0)
        .await?
        .ok_or(ApiError::NotFound("Proposal not found"))?;
    Ok(Json(proposal_from_row(&row)))
}

#[utoipa::path(
    put,
    path = "/api/proposals/{id}",
    request_body = ProposalPatch,
    params(("id" = i64, Path, description = "Proposal id")),
    responses(
        (status = 200, description = "Proposal updated", body = MessageResponse),
        (status = 400, description = "Validation failure or empty patch"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Not the owner and not staff"),
        (status = 404, description = "Proposal not found"),
    ),
    tag = "proposals"
)]
pub async fn update_proposal(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<ProposalPatch>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;

    let owner_id = fetch_proposal_owner(&pool, id)
        .await?
        .ok_or(ApiError::NotFound("Proposal not found"))?;
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

    let mut builder = sqlx::QueryBuilder::new("UPDATE proposals SET ");
    let mut fields = builder.separated(", ");
    if let Some(title) = &patch.title {
        fields.push("title = ");
        fields.push_bind_unseparated(title.trim());
    }
    if let Some(description) = &patch.description {
        fields.push("description = ");
        fields.push_bind_unseparated(description.trim());
    }
    if let Some(status) = &patch.status {
        fields.push("status = ");
        fields.push_bind_unseparated(status.trim());
    }
    if let Some(attachments) = &patch.attachments {
        fields.push("attachments = ");
        fields.push_bind_unseparated(attachments);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.build().execute(&pool.0).await?;

    Ok(Json(MessageResponse {
        message: "Proposal updated successfully".to_string(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/proposals/{id}",
    params(("id" = i64, Path, description = "Proposal id")),
    responses(
        (status = 200, description = "Proposal deleted", body = MessageResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Not the owner and not staff"),
        (status = 404, description = "Proposal not found"),
    ),
    tag = "proposals"
)]
pub async fn delete_proposal(
    Path(id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<MessageResponse>, ApiError> {
    let principal = require_auth(&headers, &pool).await?;

    let owner_id = fetch_proposal_owner(&pool, id)
        .await?
        .ok_or(ApiError::NotFound("Proposal not found"))?;
    principal.require_owner_or_staff(owner_id)?;

    sqlx::query("DELETE FROM proposals WHERE id = $1")
        .bind(id)
        .execute(&pool.0)
        .await?;
    Ok(Json(MessageResponse {
        message: "Proposal deleted successfully".to_string(),
    }))
}

fn select_proposals(suffix: &str) -> String {
    format!(
        r#"
        SELECT
            proposals.id,
            proposals.title,
            proposals.description,
            to_char(proposals.submitted_on, 'YYYY-MM-DD') AS submitted_on,
            proposals.status,
            proposals.attachments,
            proposals.user_id,
            users.username
        FROM proposals
        JOIN users ON proposals.user_id = users.id
        {suffix}
        "#
    )
}

fn proposal_from_row(row: &sqlx::postgres::PgRow) -> ProposalResponse {
    ProposalResponse {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        submitted_on: row.get("submitted_on"),
        status: row.get("status"),
        attachments: row.get("attachments"),
        user_id: row.get("user_id"),
        username: row.get("username"),
    }
}

async fn fetch_proposal_owner(pool: &PgPool, id: i64) -> Result<Option<i64>, ApiError> {
    let row = sqlx::query("SELECT user_id FROM proposals WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get("user_id")))
}

#[cfg(test)]
mod tests {
    use super::ProposalPatch;

    #[test]
    fn empty_patch_detected() {
        assert!(ProposalPatch::default().is_empty());
        let patch = ProposalPatch {
            status: Some("accepted".to_string()),
            ..ProposalPatch::default()
        };
        assert!(!patch.is_empty());
    }
}
