//! Database helpers for accounts and server-side sessions.

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::types::Role;
use super::utils::{
    generate_csrf_token, generate_session_token, hash_session_token, is_unique_violation,
};

/// Outcome when attempting to create a new account.
#[derive(Debug)]
pub(super) enum RegisterOutcome {
    Created { user_id: i64 },
    Conflict,
}

/// Credential fields needed to authenticate a login attempt.
pub(super) struct CredentialRecord {
    pub(super) user_id: i64,
    pub(super) username: String,
    pub(super) email: String,
    pub(super) role: Role,
    pub(super) password_hash: String,
    pub(super) active: bool,
}

/// Minimal data resolved from a valid session cookie.
pub(crate) struct SessionRecord {
    pub(crate) user_id: i64,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) role: Role,
}

/// Raw token pair handed back to the login handler; only hashes persist.
pub(super) struct NewSession {
    pub(super) token: String,
    pub(super) csrf_token: String,
}

pub(super) async fn insert_user(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
    role: Role,
) -> Result<RegisterOutcome> {
    let query = r"
        INSERT INTO users (username, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(RegisterOutcome::Created {
            user_id: row.get("id"),
        }),
        Err(err) if is_unique_violation(&err) => Ok(RegisterOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Look up credential data by username (used by the login flow).
pub(super) async fn lookup_credentials(
    pool: &PgPool,
    username: &str,
) -> Result<Option<CredentialRecord>> {
    let query = r"
        SELECT id, username, email, role, password_hash, active
        FROM users
        WHERE username = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup credentials")?;

    row.map(|row| {
        let role: String = row.get("role");
        let role = Role::parse(&role).ok_or_else(|| anyhow!("unknown role in database: {role}"))?;
        Ok(CredentialRecord {
            user_id: row.get("id"),
            username: row.get("username"),
            email: row.get("email"),
            role,
            password_hash: row.get("password_hash"),
            active: row.get("active"),
        })
    })
    .transpose()
}

pub(super) async fn insert_session(
    pool: &PgPool,
    user_id: i64,
    ttl_seconds: i64,
) -> Result<NewSession> {
    // Generate a random token, store only its hash, and return the raw value
    // so the caller can set the session cookie. A CSRF token is minted with
    // the session so mutating requests can be verified immediately.
    let query = r"
        INSERT INTO user_sessions (user_id, session_hash, csrf_token, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let csrf_token = generate_csrf_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(&csrf_token)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(NewSession { token, csrf_token }),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

pub(super) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    // Only accept active users and unexpired sessions.
    let query = r"
        SELECT users.id, users.username, users.email, users.role
        FROM user_sessions
        JOIN users ON users.id = user_sessions.user_id
        WHERE user_sessions.session_hash = $1
          AND user_sessions.expires_at > NOW()
          AND users.active
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    let Some(row) = row else {
        return Ok(None);
    };

    // Record activity for audit/visibility without extending the session TTL.
    let query = r"
        UPDATE user_sessions
        SET last_seen_at = NOW()
        WHERE session_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    let role: String = row.get("role");
    let role = Role::parse(&role).ok_or_else(|| anyhow!("unknown role in database: {role}"))?;
    Ok(Some(SessionRecord {
        user_id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        role,
    }))
}

pub(super) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM user_sessions WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

/// CSRF state attached to a live session row.
pub(super) struct SessionCsrf {
    pub(super) session_id: i64,
    pub(super) token: Option<String>,
}

/// Read-only lookup of the session's CSRF token by cookie hash.
///
/// Returns `Ok(None)` when the cookie does not resolve to a live session.
pub(super) async fn session_csrf(pool: &PgPool, token_hash: &[u8]) -> Result<Option<SessionCsrf>> {
    let query = r"
        SELECT id, csrf_token
        FROM user_sessions
        WHERE session_hash = $1
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session CSRF token")?;

    Ok(row.map(|row| SessionCsrf {
        session_id: row.get("id"),
        token: row.get("csrf_token"),
    }))
}

pub(super) async fn store_csrf_token(pool: &PgPool, session_id: i64, token: &str) -> Result<()> {
    let query = "UPDATE user_sessions SET csrf_token = $2 WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_id)
        .bind(token)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store minted CSRF token")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{NewSession, RegisterOutcome, SessionRecord};
    use crate::api::handlers::auth::types::Role;

    #[test]
    fn register_outcome_debug_names() {
        assert_eq!(
            format!("{:?}", RegisterOutcome::Created { user_id: 1 }),
            "Created { user_id: 1 }"
        );
        assert_eq!(format!("{:?}", RegisterOutcome::Conflict), "Conflict");
    }

    #[test]
    fn session_record_holds_values() {
        let record = SessionRecord {
            user_id: 7,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role: Role::Student,
        };
        assert_eq!(record.user_id, 7);
        assert_eq!(record.role, Role::Student);
    }

    #[test]
    fn new_session_tokens_differ() {
        let session = NewSession {
            token: "a".to_string(),
            csrf_token: "b".to_string(),
        };
        assert_ne!(session.token, session.csrf_token);
    }
}
