//! Session and identity types.

use serde::{Deserialize, Serialize};

/// Access/refresh token pair for an authenticated session.
///
/// Owned exclusively by the `SessionManager`; everything else reads the
/// access token through `SessionManager::access_token()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Console operator role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Agent,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Returns true if this role may assign tickets to agents.
    pub fn can_assign_tickets(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    /// Returns the role as its wire string (for filtering).
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Agent => "agent",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated console user. Read-only outside the session module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub role: Role,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Whether the agent is currently taking tickets. Absent for roles
    /// that never appear in the assignment pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
}

fn default_true() -> bool {
    true
}

/// Session lifecycle notifications delivered to subscribers.
///
/// `LoggedOut` is the redirect-to-login signal; the core performs no UI
/// action itself.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn(Identity),
    LoggedOut,
}

/// Successful login: the new credential pair plus the authenticated user.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub credentials: CredentialPair,
    pub user: Identity,
}

/// Successful renewal. The server may omit the refresh token, in which
/// case the previous one remains valid.
#[derive(Debug, Clone)]
pub struct RenewedCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_assignment_capability() {
        assert!(!Role::Agent.can_assign_tickets());
        assert!(Role::Admin.can_assign_tickets());
        assert!(Role::SuperAdmin.can_assign_tickets());
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::SuperAdmin).unwrap(), "\"super_admin\"");
        let role: Role = serde_json::from_str("\"agent\"").unwrap();
        assert_eq!(role, Role::Agent);
    }

    #[test]
    fn test_identity_defaults() {
        let identity: Identity =
            serde_json::from_str(r#"{"id": 3, "username": "ada", "role": "admin"}"#).unwrap();
        assert!(identity.is_active);
        assert!(identity.is_available.is_none());
    }

    #[test]
    fn test_identity_missing_id_is_rejected() {
        let result: Result<Identity, _> =
            serde_json::from_str(r#"{"username": "ada", "role": "admin"}"#);
        assert!(result.is_err());
    }
}
