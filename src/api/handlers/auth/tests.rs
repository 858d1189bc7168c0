//! Auth module tests.
//!
//! Database-backed tests run against the schema in `sql/schema.sql` and skip
//! themselves when `CONECTA_TEST_DSN` is not set.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row, postgres::PgPoolOptions};

use super::lockout::{self, FailureOutcome, LockoutState, MAX_LOGIN_ATTEMPTS};
use super::storage::{
    RegisterOutcome, delete_session, insert_session, insert_user, lookup_credentials,
    lookup_session, session_csrf, store_csrf_token,
};
use super::types::Role;
use super::utils::hash_session_token;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(dsn) = std::env::var("CONECTA_TEST_DSN") else {
        eprintln!("Skipping database test: CONECTA_TEST_DSN not set");
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&dsn)
        .await
        .context("failed to connect test pool")?;

    sqlx::raw_sql(SCHEMA_SQL)
        .execute(&pool)
        .await
        .context("failed to apply schema")?;

    Ok(Some(pool))
}

async fn create_user(pool: &PgPool, username: &str, role: Role) -> Result<i64> {
    sqlx::query("DELETE FROM users WHERE username = $1")
        .bind(username)
        .execute(pool)
        .await?;

    let hash = bcrypt::hash("secret1", 4).context("failed to hash test password")?;
    match insert_user(
        pool,
        username,
        &format!("{username}@example.com"),
        &hash,
        role,
    )
    .await?
    {
        RegisterOutcome::Created { user_id } => Ok(user_id),
        RegisterOutcome::Conflict => anyhow::bail!("unexpected conflict for {username}"),
    }
}

async fn stored_attempts(pool: &PgPool, user_id: i64) -> Result<i32> {
    let row = sqlx::query("SELECT failed_login_attempts FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get("failed_login_attempts"))
}

#[tokio::test]
async fn register_conflict_on_duplicate_username() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let _ = create_user(&pool, "dup_user", Role::Student).await?;
    let hash = bcrypt::hash("secret1", 4)?;
    let outcome = insert_user(
        &pool,
        "dup_user",
        "other@example.com",
        &hash,
        Role::Community,
    )
    .await?;
    assert!(matches!(outcome, RegisterOutcome::Conflict));
    Ok(())
}

#[tokio::test]
async fn failure_counter_locks_at_threshold() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let user_id = create_user(&pool, "lock_user", Role::Student).await?;

    for expected_remaining in (1..MAX_LOGIN_ATTEMPTS).rev() {
        let outcome = lockout::record_failure(&pool, user_id).await?;
        assert_eq!(
            outcome,
            FailureOutcome::Remaining {
                attempts: expected_remaining
            }
        );
    }

    let outcome = lockout::record_failure(&pool, user_id).await?;
    let FailureOutcome::Locked { remaining_minutes } = outcome else {
        anyhow::bail!("expected lock at threshold, got {outcome:?}");
    };
    assert!(remaining_minutes > 0 && remaining_minutes <= lockout::LOCKOUT_MINUTES);

    // The pre-auth gate now refuses the account.
    let state = lockout::check(&pool, "lock_user").await?;
    assert!(matches!(state, LockoutState::Locked { .. }));
    Ok(())
}

#[tokio::test]
async fn concurrent_failures_are_not_lost() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let user_id = create_user(&pool, "storm_user", Role::Student).await?;

    let results = tokio::join!(
        lockout::record_failure(&pool, user_id),
        lockout::record_failure(&pool, user_id),
        lockout::record_failure(&pool, user_id),
        lockout::record_failure(&pool, user_id),
    );
    results.0?;
    results.1?;
    results.2?;
    results.3?;

    assert_eq!(stored_attempts(&pool, user_id).await?, 4);
    Ok(())
}

#[tokio::test]
async fn success_resets_counter_and_lock() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let user_id = create_user(&pool, "reset_user", Role::Student).await?;

    for _ in 0..MAX_LOGIN_ATTEMPTS {
        let _ = lockout::record_failure(&pool, user_id).await?;
    }
    assert!(matches!(
        lockout::check(&pool, "reset_user").await?,
        LockoutState::Locked { .. }
    ));

    lockout::record_success(&pool, user_id).await?;
    assert_eq!(stored_attempts(&pool, user_id).await?, 0);
    assert_eq!(
        lockout::check(&pool, "reset_user").await?,
        LockoutState::Open
    );
    Ok(())
}

#[tokio::test]
async fn expired_lock_clears_on_check() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let user_id = create_user(&pool, "expired_user", Role::Student).await?;
    for _ in 0..MAX_LOGIN_ATTEMPTS {
        let _ = lockout::record_failure(&pool, user_id).await?;
    }

    // Simulate the lock window elapsing.
    sqlx::query("UPDATE users SET locked_until = NOW() - INTERVAL '1 second' WHERE id = $1")
        .bind(user_id)
        .execute(&pool)
        .await?;

    assert_eq!(
        lockout::check(&pool, "expired_user").await?,
        LockoutState::Open
    );
    assert_eq!(stored_attempts(&pool, user_id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn unknown_username_reports_open() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    assert_eq!(
        lockout::check(&pool, "no_such_user").await?,
        LockoutState::Open
    );
    Ok(())
}

#[tokio::test]
async fn session_round_trip() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let user_id = create_user(&pool, "session_user", Role::Community).await?;
    let session = insert_session(&pool, user_id, 3600).await?;
    let token_hash = hash_session_token(&session.token);

    let record = lookup_session(&pool, &token_hash)
        .await?
        .context("expected live session")?;
    assert_eq!(record.user_id, user_id);
    assert_eq!(record.username, "session_user");
    assert_eq!(record.role, Role::Community);

    delete_session(&pool, &token_hash).await?;
    assert!(lookup_session(&pool, &token_hash).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn expired_session_is_rejected() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let user_id = create_user(&pool, "ttl_user", Role::Student).await?;
    let session = insert_session(&pool, user_id, 3600).await?;
    let token_hash = hash_session_token(&session.token);

    sqlx::query("UPDATE user_sessions SET expires_at = NOW() - INTERVAL '1 second' WHERE session_hash = $1")
        .bind(&token_hash)
        .execute(&pool)
        .await?;

    assert!(lookup_session(&pool, &token_hash).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn csrf_token_persists_per_session() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let user_id = create_user(&pool, "csrf_user", Role::Student).await?;
    let session = insert_session(&pool, user_id, 3600).await?;
    let token_hash = hash_session_token(&session.token);

    let csrf = session_csrf(&pool, &token_hash)
        .await?
        .context("expected session row")?;
    assert_eq!(csrf.token.as_deref(), Some(session.csrf_token.as_str()));

    store_csrf_token(&pool, csrf.session_id, "rotated-token").await?;
    let csrf = session_csrf(&pool, &token_hash)
        .await?
        .context("expected session row")?;
    assert_eq!(csrf.token.as_deref(), Some("rotated-token"));
    Ok(())
}

#[tokio::test]
async fn inactive_user_has_no_credentials_for_login() -> Result<()> {
    let Some(pool) = test_pool().await? else {
        return Ok(());
    };

    let user_id = create_user(&pool, "inactive_user", Role::Student).await?;
    sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
        .bind(user_id)
        .execute(&pool)
        .await?;

    let record = lookup_credentials(&pool, "inactive_user")
        .await?
        .context("expected credential row")?;
    assert!(!record.active);

    // Sessions for deactivated users stop resolving.
    let session = insert_session(&pool, user_id, 3600).await?;
    let token_hash = hash_session_token(&session.token);
    assert!(lookup_session(&pool, &token_hash).await?.is_none());
    Ok(())
}
