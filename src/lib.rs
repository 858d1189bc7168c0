//! # Conecta (campus & community project API)
//!
//! `conecta` is a role-based CRUD API connecting community members, students
//! and staff around project proposals. It handles session-cookie
//! authentication with account lockout, role and ownership authorization, and
//! CSRF protection for state-changing requests.
//!
//! ## Roles
//!
//! A single role vocabulary is shared by validation, handlers and the
//! database schema: `Student`, `Community`, `Staff-Admin`, `Staff-Supervisor`.
//! Staff roles may override ownership checks on owned resources.
//!
//! ## Authentication & lockout
//!
//! Passwords are stored as bcrypt hashes. Five consecutive failed logins lock
//! the account for thirty minutes; the counter increments in a single SQL
//! statement so concurrent failures are never lost. Unknown usernames answer
//! exactly like a wrong password, including a comparable-cost hash check.
//!
//! ## Sessions & CSRF
//!
//! Sessions are server-side rows keyed by the SHA-256 of an opaque cookie
//! token, with a 24 hour absolute TTL. Each session carries a random CSRF
//! token; unsafe methods must echo it and the comparison is constant-time.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
