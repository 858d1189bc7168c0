//! Small helpers for credential validation and token handling.

use anyhow::{Context, Result};
use base64::Engine;
use once_cell::sync::Lazy;
use rand::{RngCore, rngs::OsRng};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Work factor for bcrypt credential hashes.
pub(crate) const BCRYPT_COST: u32 = 10;

/// Sentinel hash verified against when an account does not exist, so the
/// missing-account path costs the same as a wrong password.
static DUMMY_PASSWORD_HASH: Lazy<String> = Lazy::new(|| {
    bcrypt::hash("conecta-dummy-credential", BCRYPT_COST)
        .unwrap_or_else(|_| String::from("$2b$10$invalidinvalidinvalidinvalidinvalidinvalid"))
});

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Usernames are 3-50 chars of letters, digits, underscores and hyphens.
pub(crate) fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_-]{3,50}$").is_ok_and(|regex| regex.is_match(username))
}

/// Passwords must be at least 6 characters; bcrypt caps input at 72 bytes.
pub(crate) fn valid_password(password: &str) -> bool {
    let length = password.len();
    (6..=72).contains(&length)
}

/// Create a new session token for the auth cookie.
/// The raw value is only returned to set the cookie; the database stores a hash.
pub(crate) fn generate_session_token() -> Result<String> {
    random_token().context("failed to generate session token")
}

/// Create a new per-session CSRF token, mirrored to the client as-is.
pub(crate) fn generate_csrf_token() -> Result<String> {
    random_token().context("failed to generate CSRF token")
}

fn random_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to read system randomness")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a session token so raw values never touch the database.
/// The hash is used for lookups when the cookie is presented.
pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Run a bcrypt verification against the sentinel hash and discard the result.
pub(super) fn burn_password_verification(password: &str) {
    let _ = bcrypt::verify(password, &DUMMY_PASSWORD_HASH);
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_username_enforces_charset_and_length() {
        assert!(valid_username("alice"));
        assert!(valid_username("alice_dev-01"));
        assert!(!valid_username("al"));
        assert!(!valid_username("has space"));
        assert!(!valid_username(&"a".repeat(51)));
    }

    #[test]
    fn valid_password_enforces_bounds() {
        assert!(valid_password("secret1"));
        assert!(!valid_password("short"));
        assert!(!valid_password(&"p".repeat(73)));
    }

    #[test]
    fn generate_session_token_round_trip() {
        let decoded_len = generate_session_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn csrf_tokens_are_unique() {
        let first = generate_csrf_token().ok();
        let second = generate_csrf_token().ok();
        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn hash_session_token_stable() {
        let first = hash_session_token("token");
        let second = hash_session_token("token");
        let different = hash_session_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn burn_password_verification_does_not_panic() {
        burn_password_verification("whatever");
    }

    #[test]
    fn is_unique_violation_ignores_row_not_found() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
