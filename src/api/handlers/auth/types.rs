//! Request/response types for auth endpoints and the shared role vocabulary.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The single role vocabulary shared by validation, handlers and the schema.
///
/// The serialized names are the public API values and must match the
/// `users.role` CHECK constraint in the database.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub enum Role {
    Student,
    Community,
    #[serde(rename = "Staff-Admin")]
    StaffAdmin,
    #[serde(rename = "Staff-Supervisor")]
    StaffSupervisor,
}

impl Role {
    /// Roles allowed to override ownership checks on owned resources.
    pub const STAFF: [Self; 2] = [Self::StaffAdmin, Self::StaffSupervisor];

    /// Canonical string stored in the database and returned in payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "Student",
            Self::Community => "Community",
            Self::StaffAdmin => "Staff-Admin",
            Self::StaffSupervisor => "Staff-Supervisor",
        }
    }

    /// Parse the database representation back into a role.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Student" => Some(Self::Student),
            "Community" => Some(Self::Community),
            "Staff-Admin" => Some(Self::StaffAdmin),
            "Staff-Supervisor" => Some(Self::StaffSupervisor),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_staff(self) -> bool {
        Self::STAFF.contains(&self)
    }
}

/// The role arrives as a string so an unknown value can be reported as a
/// field-level validation error instead of a body rejection.
#[derive(ToSchema, Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    #[schema(value_type = String)]
    pub password: SecretString,
    pub role: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    #[schema(value_type = String)]
    pub password: SecretString,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct RegisterResponse {
    pub message: String,
    #[serde(rename = "userId")]
    pub user_id: i64,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct LoginResponse {
    pub message: String,
    pub user: UserSummary,
    #[serde(rename = "csrfToken")]
    pub csrf_token: String,
}

/// 401 body for credential failures; the counter hint is present only while
/// an account exists to count against.
#[derive(ToSchema, Serialize, Debug)]
pub struct LoginRejection {
    pub error: &'static str,
    #[serde(rename = "attemptsRemaining", skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<i32>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct SessionResponse {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct CsrfTokenResponse {
    #[serde(rename = "csrfToken")]
    pub csrf_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn role_round_trips_through_strings() {
        for role in [
            Role::Student,
            Role::Community,
            Role::StaffAdmin,
            Role::StaffSupervisor,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("Administrador"), None);
    }

    #[test]
    fn staff_roles_are_staff() {
        assert!(Role::StaffAdmin.is_staff());
        assert!(Role::StaffSupervisor.is_staff());
        assert!(!Role::Student.is_staff());
        assert!(!Role::Community.is_staff());
    }

    #[test]
    fn role_serializes_to_public_names() -> Result<()> {
        let value = serde_json::to_value(Role::StaffAdmin)?;
        assert_eq!(value, serde_json::json!("Staff-Admin"));
        let decoded: Role = serde_json::from_value(serde_json::json!("Staff-Supervisor"))?;
        assert_eq!(decoded, Role::StaffSupervisor);
        Ok(())
    }

    #[test]
    fn register_request_accepts_valid_payload() -> Result<()> {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "secret1",
            "role": "Student",
        }))?;
        assert_eq!(request.username, "alice");
        assert_eq!(Role::parse(&request.role), Some(Role::Student));
        Ok(())
    }

    #[test]
    fn login_rejection_omits_missing_counter() -> Result<()> {
        let body = LoginRejection {
            error: "Invalid credentials",
            attempts_remaining: None,
        };
        let value = serde_json::to_value(&body)?;
        assert!(value.get("attemptsRemaining").is_none());

        let body = LoginRejection {
            error: "Invalid credentials",
            attempts_remaining: Some(3),
        };
        let value = serde_json::to_value(&body)?;
        let remaining = value
            .get("attemptsRemaining")
            .and_then(serde_json::Value::as_i64)
            .context("missing attemptsRemaining")?;
        assert_eq!(remaining, 3);
        Ok(())
    }
}
