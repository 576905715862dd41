use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use gatehouse_core::StoreError;

use crate::error::AuthError;

/// Newtype for a plaintext password so it cannot leak through Debug output.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for a stored PHC-format password hash.
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Well-formed hash of no account's password, with the same cost parameters
/// as [`hash_password`]. Verifying against it burns the same work as a real
/// check and always mismatches.
const ENUMERATION_GUARD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Validate a candidate password against the fixed policy.
pub fn validate_password(password: &Password) -> Result<(), AuthError> {
    if password.as_str().len() < 8 {
        return Err(AuthError::InvalidPassword(
            "password must be at least 8 characters",
        ));
    }
    if password.as_str().len() > 128 {
        return Err(AuthError::InvalidPassword(
            "password must be at most 128 characters",
        ));
    }
    Ok(())
}

/// Hash a password using Argon2id with default parameters; the generated
/// salt rides inside the PHC string.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, AuthError> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("failed to hash password: {e}")))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash.
///
/// Returns `Ok(false)` on mismatch; a hash that does not parse is corrupt
/// stored data, not a failed login.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(password_hash.as_str()).map_err(|e| {
        AuthError::Store(StoreError::corrupt(anyhow::anyhow!(
            "stored password hash does not parse: {e}"
        )))
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .is_ok())
}

/// Burn a verification against a fixed hash. Called on the unknown-identifier
/// path so authentication latency does not reveal whether an account exists.
pub fn burn_verification(password: &Password) {
    if let Ok(parsed_hash) = PasswordHash::new(ENUMERATION_GUARD_HASH) {
        let _ = Argon2::default().verify_password(password.as_str().as_bytes(), &parsed_hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(!hash.as_str().is_empty());
        assert!(hash.as_str().starts_with("$argon2"));
    }

    #[test]
    fn test_verify_password_correct() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(verify_password(&password, &hash).unwrap());
    }

    #[test]
    fn test_verify_password_incorrect() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        let wrong_password = Password::new("wrongPassword".to_string());
        assert!(!verify_password(&wrong_password, &hash).unwrap());
    }

    #[test]
    fn test_corrupt_hash_is_not_a_mismatch() {
        let password = Password::new("mySecurePassword123".to_string());
        let corrupt = PasswordHashString::new("not-a-phc-string".to_string());

        let err = verify_password(&password, &corrupt).unwrap_err();
        assert!(matches!(err, AuthError::Store(_)));
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash1 = hash_password(&password).expect("Failed to hash password");
        let hash2 = hash_password(&password).expect("Failed to hash password");

        // Same password, different salts
        assert_ne!(hash1.as_str(), hash2.as_str());

        assert!(verify_password(&password, &hash1).unwrap());
        assert!(verify_password(&password, &hash2).unwrap());
    }

    #[test]
    fn test_enumeration_guard_hash_parses_and_mismatches() {
        let guard = PasswordHashString::new(ENUMERATION_GUARD_HASH.to_string());
        let password = Password::new("anything-at-all".to_string());
        assert!(!verify_password(&password, &guard).unwrap());
    }

    #[test]
    fn test_password_policy_bounds() {
        assert!(validate_password(&Password::new("longenough".into())).is_ok());
        assert!(validate_password(&Password::new("short".into())).is_err());
        assert!(validate_password(&Password::new("x".repeat(129))).is_err());
        assert!(validate_password(&Password::new("x".repeat(128))).is_ok());
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let password = Password::new("topsecret123".to_string());
        assert_eq!(format!("{password:?}"), "Password(***)");
    }
}
