//! Account lockout state machine for failed-login throttling.
//!
//! Flow Overview:
//! 1) `check` reads the counter and lock expiry before credentials are verified.
//! 2) `record_failure` increments the counter and sets the lock in one statement.
//! 3) `record_success` resets the counter and clears the lock.
//!
//! Scaling: counter updates are single `UPDATE ... RETURNING` statements, so
//! concurrent failures against one account serialize at the row and no
//! increment is lost. The database clock (`NOW()`) is the only time source
//! used for lock decisions; the pure evaluation below exists so the
//! transition rules can be tested without a running database.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;

pub(crate) const MAX_LOGIN_ATTEMPTS: i32 = 5;
pub(crate) const LOCKOUT_MINUTES: i64 = 30;

/// Lockout state as seen by the login flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LockoutState {
    /// No active lock; authentication may proceed.
    Open,
    /// Lock expiry is in the future; authentication is refused.
    Locked { remaining_minutes: i64 },
}

/// Outcome of recording a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FailureOutcome {
    /// This failure crossed the threshold and locked the account.
    Locked { remaining_minutes: i64 },
    /// Attempts left before the account locks.
    Remaining { attempts: i32 },
}

/// Pure transition rule: a lock expiry in the future means `Locked`.
pub(crate) fn evaluate(locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> LockoutState {
    match locked_until {
        Some(expiry) if expiry > now => LockoutState::Locked {
            remaining_minutes: remaining_minutes(expiry, now),
        },
        _ => LockoutState::Open,
    }
}

/// Minutes until `expiry`, rounded up, never below 1 while locked.
pub(crate) fn remaining_minutes(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = expiry.signed_duration_since(now).num_seconds();
    ((seconds + 59) / 60).max(1)
}

/// Read the lockout state for a username.
///
/// An expired lock is cleared here as a side effect (the passive transition
/// back to `Open`). Unknown usernames report `Open` so the caller cannot tell
/// missing accounts from unlocked ones.
pub(super) async fn check(pool: &PgPool, username: &str) -> Result<LockoutState> {
    let query = "SELECT locked_until, NOW() AS now FROM users WHERE username = $1";
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
        .context("failed to read lockout state")?;

    let Some(row) = row else {
        return Ok(LockoutState::Open);
    };

    let locked_until: Option<DateTime<Utc>> = row.get("locked_until");
    let now: DateTime<Utc> = row.get("now");

    match evaluate(locked_until, now) {
        LockoutState::Open => {
            if locked_until.is_some() {
                clear_expired_lock(pool, username).await?;
            }
            Ok(LockoutState::Open)
        }
        locked => Ok(locked),
    }
}

/// Clear an expired lock; the `WHERE` guard keeps this a no-op if another
/// request already reset the row or the lock is still active.
async fn clear_expired_lock(pool: &PgPool, username: &str) -> Result<()> {
    let query = r"
        UPDATE users
        SET failed_login_attempts = 0, locked_until = NULL
        WHERE username = $1
          AND locked_until IS NOT NULL
          AND locked_until <= NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(username)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to clear expired lock")?;
    Ok(())
}

/// Record one failed attempt atomically and lock the account when the
/// configured threshold is reached.
pub(super) async fn record_failure(pool: &PgPool, user_id: i64) -> Result<FailureOutcome> {
    let query = r"
        UPDATE users
        SET failed_login_attempts = failed_login_attempts + 1,
            locked_until = CASE
                WHEN failed_login_attempts + 1 >= $2
                THEN NOW() + ($3 * INTERVAL '1 minute')
                ELSE locked_until
            END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING failed_login_attempts, locked_until, NOW() AS now
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(MAX_LOGIN_ATTEMPTS)
        .bind(LOCKOUT_MINUTES)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to record login failure")?;

    let attempts: i32 = row.get("failed_login_attempts");
    let locked_until: Option<DateTime<Utc>> = row.get("locked_until");
    let now: DateTime<Utc> = row.get("now");

    if attempts >= MAX_LOGIN_ATTEMPTS {
        let remaining = locked_until.map_or(LOCKOUT_MINUTES, |expiry| {
            remaining_minutes(expiry, now)
        });
        Ok(FailureOutcome::Locked {
            remaining_minutes: remaining,
        })
    } else {
        Ok(FailureOutcome::Remaining {
            attempts: MAX_LOGIN_ATTEMPTS - attempts,
        })
    }
}

/// Successful logins always reset the counter and clear any lock.
pub(super) async fn record_success(pool: &PgPool, user_id: i64) -> Result<()> {
    let query = r"
        UPDATE users
        SET failed_login_attempts = 0, locked_until = NULL
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to reset login failures")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{LOCKOUT_MINUTES, LockoutState, evaluate, remaining_minutes};
    use chrono::{Duration, TimeZone, Utc};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap()
    }

    #[test]
    fn no_expiry_is_open() {
        assert_eq!(evaluate(None, now()), LockoutState::Open);
    }

    #[test]
    fn past_expiry_is_open() {
        let expired = now() - Duration::seconds(1);
        assert_eq!(evaluate(Some(expired), now()), LockoutState::Open);
    }

    #[test]
    fn future_expiry_is_locked_with_ceiled_minutes() {
        let expiry = now() + Duration::minutes(29) + Duration::seconds(30);
        assert_eq!(
            evaluate(Some(expiry), now()),
            LockoutState::Locked {
                remaining_minutes: 30
            }
        );
    }

    #[test]
    fn full_window_reports_configured_minutes() {
        let expiry = now() + Duration::minutes(LOCKOUT_MINUTES);
        assert_eq!(
            evaluate(Some(expiry), now()),
            LockoutState::Locked {
                remaining_minutes: LOCKOUT_MINUTES
            }
        );
    }

    #[test]
    fn remaining_minutes_rounds_up() {
        assert_eq!(remaining_minutes(now() + Duration::seconds(1), now()), 1);
        assert_eq!(remaining_minutes(now() + Duration::seconds(60), now()), 1);
        assert_eq!(remaining_minutes(now() + Duration::seconds(61), now()), 2);
    }

    #[test]
    fn remaining_minutes_never_below_one() {
        // A lock observed at the instant of expiry still reports one minute.
        assert_eq!(remaining_minutes(now(), now()), 1);
    }

    #[test]
    fn exact_expiry_instant_is_open() {
        // The comparison is strict: a lock expiring exactly now is no longer active.
        assert_eq!(evaluate(Some(now()), now()), LockoutState::Open);
    }
}
