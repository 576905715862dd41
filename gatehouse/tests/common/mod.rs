//! Test helpers for gatehouse integration tests.
//!
//! Every test runs against the in-memory store; the PostgreSQL backend has
//! its own ignored suite that needs a live database.

#![allow(dead_code)]

use std::sync::Arc;

use secrecy::Secret;

use gatehouse::config::TokenConfig;
use gatehouse::models::User;
use gatehouse::services::{AuthService, AuthSession};
use gatehouse::store::MemoryStore;
use gatehouse::utils::Password;

pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// An engine wired to a fresh in-memory store.
pub struct TestApp {
    pub auth: Arc<AuthService<MemoryStore>>,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::spawn_with(test_token_config())
    }

    pub fn spawn_with(token_config: TokenConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let auth = Arc::new(AuthService::new(Arc::clone(&store), &token_config));
        Self { auth, store }
    }

    /// Register a user with the shared test password.
    pub async fn register(&self, email: &str) -> User {
        self.auth
            .register_user(email, test_password())
            .await
            .expect("Failed to register user")
    }

    /// Authenticate with the shared test password.
    pub async fn login(&self, email: &str) -> AuthSession {
        self.auth
            .authenticate(email, test_password())
            .await
            .expect("Failed to authenticate")
    }
}

pub fn test_password() -> Password {
    Password::new(TEST_PASSWORD.to_string())
}

pub fn test_token_config() -> TokenConfig {
    TokenConfig {
        signing_key: Secret::new("integration-test-signing-key".to_string()),
        access_token_expiry_minutes: 15,
        refresh_token_expiry_hours: 24,
        expiry_leeway_seconds: 0,
        revoked_retention_hours: 48,
    }
}

/// A config whose access tokens are born expired. Refresh tokens stay valid.
pub fn expired_access_config() -> TokenConfig {
    TokenConfig {
        access_token_expiry_minutes: -5,
        ..test_token_config()
    }
}

/// A config whose refresh tokens are born expired. Access tokens stay valid.
pub fn expired_refresh_config() -> TokenConfig {
    TokenConfig {
        refresh_token_expiry_hours: -5,
        ..test_token_config()
    }
}
