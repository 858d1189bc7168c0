//! Authenticated principal extraction and authorization helpers.
//!
//! Flow Overview: read the session cookie, resolve it to a user, and return a
//! principal that downstream handlers use for role and ownership checks.
//! Authentication is always checked before roles, and role/ownership checks
//! run before the mutating statement, never after.

use axum::http::HeaderMap;
use sqlx::PgPool;

use super::session::authenticate_session;
use super::types::Role;
use crate::api::error::ApiError;

/// Authenticated user context derived from the session cookie.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

/// Resolve a session cookie into a principal, or return 401 for missing sessions.
pub async fn require_auth(headers: &HeaderMap, pool: &PgPool) -> Result<Principal, ApiError> {
    match authenticate_session(headers, pool).await {
        Ok(Some(record)) => Ok(Principal {
            user_id: record.user_id,
            username: record.username,
            role: record.role,
        }),
        Ok(None) => Err(ApiError::Unauthenticated),
        Err(_) => Err(ApiError::Internal(anyhow::anyhow!(
            "session lookup failed"
        ))),
    }
}

impl Principal {
    /// Reject principals whose role is not in `allowed`.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Insufficient permissions"))
        }
    }

    /// Staff-only gate for administrative operations.
    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Staff access required"))
        }
    }

    /// Owners may mutate their own resources; staff roles override.
    ///
    /// Callers must fetch the resource first so an unknown id yields 404
    /// before this comparison runs.
    pub fn require_owner_or_staff(&self, owner_id: i64) -> Result<(), ApiError> {
        if self.user_id == owner_id || self.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "You can only modify your own resources",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Principal;
    use crate::api::error::ApiError;
    use crate::api::handlers::auth::types::Role;

    fn principal(role: Role) -> Principal {
        Principal {
            user_id: 10,
            username: "alice".to_string(),
            role,
        }
    }

    #[test]
    fn require_role_accepts_listed_roles() {
        assert!(
            principal(Role::Community)
                .require_role(&[Role::Community])
                .is_ok()
        );
        assert!(matches!(
            principal(Role::Student).require_role(&[Role::Community]),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn require_staff_rejects_non_staff() {
        assert!(principal(Role::StaffAdmin).require_staff().is_ok());
        assert!(principal(Role::StaffSupervisor).require_staff().is_ok());
        assert!(matches!(
            principal(Role::Community).require_staff(),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn owner_may_mutate_own_resource() {
        assert!(principal(Role::Student).require_owner_or_staff(10).is_ok());
    }

    #[test]
    fn staff_overrides_ownership() {
        assert!(
            principal(Role::StaffSupervisor)
                .require_owner_or_staff(99)
                .is_ok()
        );
    }

    #[test]
    fn stranger_is_forbidden() {
        assert!(matches!(
            principal(Role::Student).require_owner_or_staff(99),
            Err(ApiError::Forbidden(_))
        ));
    }
}
