//! CSRF token issuance and verification for state-changing requests.
//!
//! Flow Overview:
//! - Safe methods (GET/HEAD/OPTIONS) pass through; when a live session lacks a
//!   token one is minted, and the current token is mirrored back in an
//!   `x-csrf-token` response header.
//! - Unsafe methods must present the session's token via header or a `_csrf`
//!   field in a JSON body. Comparison is length-checked, then constant-time.
//! - Requests without a session cookie pass through untouched; there is no
//!   cookie to forge and the handlers enforce authentication themselves.

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::{Extension, Request},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use sqlx::PgPool;
use subtle::ConstantTimeEq;
use tracing::error;

use super::session::extract_session_token;
use super::storage::{SessionCsrf, session_csrf, store_csrf_token};
use super::types::CsrfTokenResponse;
use super::utils::{generate_csrf_token, hash_session_token};
use crate::api::error::ApiError;

const CSRF_HEADER: &str = "x-csrf-token";
const CSRF_HEADER_ALT: &str = "csrf-token";
const CSRF_BODY_FIELD: &str = "_csrf";

/// Largest JSON body the guard will buffer while looking for `_csrf`.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Middleware enforcing the CSRF handshake around every route.
pub async fn guard(request: Request, next: Next) -> Response {
    let Some(pool) = request.extensions().get::<PgPool>().cloned() else {
        error!("CSRF guard missing database pool extension");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    if is_safe_method(request.method()) {
        return mirror_token(pool, request, next).await;
    }

    let Some(session_token) = extract_session_token(request.headers()) else {
        return next.run(request).await;
    };
    let token_hash = hash_session_token(&session_token);

    let session = match session_csrf(&pool, &token_hash).await {
        Ok(session) => session,
        Err(err) => {
            error!("Failed to lookup CSRF token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    // An expired or unknown cookie carries no CSRF obligation; the handler's
    // authentication check produces the 401.
    let Some(SessionCsrf { token: stored, .. }) = session else {
        return next.run(request).await;
    };

    let (client_token, request) = match client_token(request).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    let Some(client_token) = client_token else {
        return forbidden("CSRF token missing");
    };
    let Some(stored) = stored else {
        return forbidden("CSRF token validation failed");
    };

    if !tokens_match(&client_token, &stored) {
        return forbidden("CSRF token validation failed");
    }

    next.run(request).await
}

#[utoipa::path(
    get,
    path = "/api/csrf-token",
    responses(
        (status = 200, description = "Current CSRF token for the session", body = CsrfTokenResponse),
        (status = 401, description = "Missing or invalid session cookie")
    ),
    tag = "auth"
)]
pub async fn csrf_token(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Json<CsrfTokenResponse>, ApiError> {
    let Some(session_token) = extract_session_token(&headers) else {
        return Err(ApiError::Unauthenticated);
    };
    let token_hash = hash_session_token(&session_token);
    let token = ensure_token(&pool, &token_hash)
        .await?
        .ok_or(ApiError::Unauthenticated)?;
    Ok(Json(CsrfTokenResponse { csrf_token: token }))
}

/// Return the session's token, minting and persisting one when absent.
async fn ensure_token(pool: &PgPool, token_hash: &[u8]) -> Result<Option<String>, ApiError> {
    let Some(session) = session_csrf(pool, token_hash).await? else {
        return Ok(None);
    };
    if let Some(token) = session.token {
        return Ok(Some(token));
    }
    let token = generate_csrf_token()?;
    store_csrf_token(pool, session.session_id, &token).await?;
    Ok(Some(token))
}

/// Safe-method path: opportunistically mint and always echo the token.
async fn mirror_token(pool: PgPool, request: Request, next: Next) -> Response {
    let token = match extract_session_token(request.headers()) {
        Some(session_token) => {
            let token_hash = hash_session_token(&session_token);
            match ensure_token(&pool, &token_hash).await {
                Ok(token) => token,
                Err(err) => {
                    // Minting is best-effort on reads; the request itself still succeeds.
                    error!("Failed to mint CSRF token: {err}");
                    None
                }
            }
        }
        None => None,
    };

    let mut response = next.run(request).await;
    if let Some(value) = token.as_deref().and_then(|t| HeaderValue::from_str(t).ok()) {
        response.headers_mut().insert(CSRF_HEADER, value);
    }
    response
}

const fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Pull the client-supplied token from headers, falling back to a `_csrf`
/// field in a JSON body. The body is buffered and restored so extractors
/// downstream still see it.
async fn client_token(request: Request) -> Result<(Option<String>, Request), Response> {
    if let Some(token) = header_token(request.headers()) {
        return Ok((Some(token), request));
    }

    let is_json = request
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if !is_json {
        return Ok((None, request));
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Request body too large" })),
            )
                .into_response());
        }
    };

    let token = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|value| {
            value
                .get(CSRF_BODY_FIELD)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        });

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok((token, request))
}

fn header_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CSRF_HEADER)
        .or_else(|| headers.get(CSRF_HEADER_ALT))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|token| !token.is_empty())
}

/// Length check first, then constant-time comparison of the contents.
fn tokens_match(client: &str, stored: &str) -> bool {
    if client.len() != stored.len() {
        return false;
    }
    client.as_bytes().ct_eq(stored.as_bytes()).into()
}

fn forbidden(message: &'static str) -> Response {
    (StatusCode::FORBIDDEN, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn safe_methods_classified() {
        assert!(is_safe_method(&Method::GET));
        assert!(is_safe_method(&Method::HEAD));
        assert!(is_safe_method(&Method::OPTIONS));
        assert!(!is_safe_method(&Method::POST));
        assert!(!is_safe_method(&Method::PUT));
        assert!(!is_safe_method(&Method::DELETE));
    }

    #[test]
    fn tokens_match_requires_equal_length() {
        assert!(!tokens_match("short", "a-longer-token"));
        assert!(!tokens_match("a-longer-token", "short"));
    }

    #[test]
    fn tokens_match_compares_content() {
        assert!(tokens_match("same-token", "same-token"));
        assert!(!tokens_match("same-tokeN", "same-token"));
    }

    #[test]
    fn header_token_checks_both_names() -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER, HeaderValue::from_static("primary"));
        let token = header_token(&headers).context("expected token")?;
        assert_eq!(token, "primary");

        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER_ALT, HeaderValue::from_static("fallback"));
        let token = header_token(&headers).context("expected token")?;
        assert_eq!(token, "fallback");
        Ok(())
    }

    #[test]
    fn header_token_ignores_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER, HeaderValue::from_static(""));
        assert_eq!(header_token(&headers), None);
    }

    #[tokio::test]
    async fn client_token_reads_json_body_and_restores_it() -> Result<()> {
        let body = serde_json::json!({ "_csrf": "from-body", "title": "Idea" }).to_string();
        let request = Request::builder()
            .method(Method::POST)
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.clone()))?;

        let (token, request) = client_token(request)
            .await
            .map_err(|_| anyhow::anyhow!("unexpected rejection"))?;
        assert_eq!(token.as_deref(), Some("from-body"));

        let restored = to_bytes(request.into_body(), MAX_BODY_BYTES).await?;
        assert_eq!(restored, body.as_bytes());
        Ok(())
    }

    #[tokio::test]
    async fn client_token_skips_non_json_bodies() -> Result<()> {
        let request = Request::builder()
            .method(Method::DELETE)
            .body(Body::empty())?;
        let (token, _request) = client_token(request)
            .await
            .map_err(|_| anyhow::anyhow!("unexpected rejection"))?;
        assert_eq!(token, None);
        Ok(())
    }
}
