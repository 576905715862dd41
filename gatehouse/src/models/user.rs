//! User model - account identity, with credentials split into their own row
//! shape so password hashes never ride along on reads that do not verify.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// User entity. Carries no credential material.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new active user.
    pub fn new(email: String) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// Credential row consulted during authentication and password change.
/// Never serialized and never returned by the facade.
#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub password_hash: String,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_starts_active() {
        let user = User::new("a@example.com".to_string());
        assert!(user.is_active);
        assert_eq!(user.email, "a@example.com");
    }

    #[test]
    fn test_new_users_get_distinct_ids() {
        let a = User::new("a@example.com".to_string());
        let b = User::new("b@example.com".to_string());
        assert_ne!(a.user_id, b.user_id);
    }

    #[test]
    fn test_serialized_user_carries_no_credential_fields() {
        let user = User::new("a@example.com".to_string());
        let value = serde_json::to_value(&user).expect("Failed to serialize user");
        let object = value.as_object().expect("User should serialize to an object");

        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["created_at", "email", "is_active", "user_id"]);
    }
}
