//! Auth handlers and supporting modules.
//!
//! This module coordinates credential authentication, session management,
//! account lockout and CSRF protection.
//!
//! ## Account Lockout
//!
//! Login failures are counted per account. Five consecutive failures lock the
//! account for thirty minutes; a successful login or an expired lock resets
//! the counter. The increment is a single SQL statement so concurrent
//! failures serialize at the row.
//!
//! ## Sessions
//!
//! Sessions are server-side rows keyed by the SHA-256 of an opaque cookie
//! token with a 24 hour absolute TTL. Each session carries the CSRF token
//! verified by the [`csrf`] guard on state-changing requests.

pub(crate) mod csrf;
pub(crate) mod lockout;
pub(crate) mod login;
pub(crate) mod principal;
pub(crate) mod session;
mod state;
mod storage;
pub(crate) mod types;
pub(crate) mod utils;

pub use principal::{Principal, require_auth};
pub use state::AuthConfig;
pub use types::Role;

#[cfg(test)]
mod tests;
