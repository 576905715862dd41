use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::authz::{self, Action};
use crate::config::TokenConfig;
use crate::error::AuthError;
use crate::models::{Membership, OrgMember, OrgMembership, Organization, Role, User};
use crate::services::token::{TokenKind, TokenPair, TokenService};
use crate::store::GatehouseStore;
use crate::utils::password::{
    burn_verification, hash_password, validate_password, verify_password,
};
use crate::utils::{Password, PasswordHashString};

/// Successful authentication: the resolved identity plus a fresh session.
#[derive(Debug, Serialize)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub tokens: TokenPair,
}

/// A positive access decision: who the caller is and the role that granted
/// the action.
#[derive(Debug, Clone, Serialize)]
pub struct AccessGrant {
    pub user_id: Uuid,
    pub role: Role,
}

/// The engine facade. Composes the token service, the credential store, the
/// membership registry, and the capability table behind the handful of calls
/// a transport layer needs.
pub struct AuthService<S> {
    store: Arc<S>,
    tokens: TokenService,
    revoked_retention_hours: i64,
}

impl<S: GatehouseStore> AuthService<S> {
    pub fn new(store: Arc<S>, token_config: &TokenConfig) -> Self {
        Self {
            store,
            tokens: TokenService::new(token_config),
            revoked_retention_hours: token_config.revoked_retention_hours,
        }
    }

    // ==================== Identity ====================

    #[tracing::instrument(skip(self, password))]
    pub async fn register_user(&self, email: &str, password: Password) -> Result<User, AuthError> {
        validate_email(email)?;
        validate_password(&password)?;
        let password_hash = hash_password(&password)?;

        let user = User::new(email.to_string());
        self.store.create_user(&user, &password_hash).await?;

        tracing::info!(user_id = %user.user_id, "user registered");
        Ok(user)
    }

    /// Resolve credentials to a fresh session.
    ///
    /// The error never distinguishes unknown email, wrong password, or a
    /// deactivated account, and the unknown-email path still performs a hash
    /// verification so its latency matches the known-email path.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: Password,
    ) -> Result<AuthSession, AuthError> {
        let Some(credentials) = self.store.find_credentials_by_email(email).await? else {
            burn_verification(&password);
            return Err(AuthError::AuthenticationFailed);
        };

        let stored = PasswordHashString::new(credentials.password_hash.clone());
        if !verify_password(&password, &stored)? {
            return Err(AuthError::AuthenticationFailed);
        }
        if !credentials.is_active {
            return Err(AuthError::AuthenticationFailed);
        }

        let tokens = self.tokens.issue_pair(credentials.user_id)?;
        Ok(AuthSession {
            user_id: credentials.user_id,
            tokens,
        })
    }

    #[tracing::instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: Password,
        new_password: Password,
    ) -> Result<(), AuthError> {
        let credentials = self
            .store
            .find_credentials_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let stored = PasswordHashString::new(credentials.password_hash.clone());
        if !verify_password(&current_password, &stored)? {
            return Err(AuthError::AuthenticationFailed);
        }
        if !credentials.is_active {
            return Err(AuthError::AuthenticationFailed);
        }

        validate_password(&new_password)?;
        let password_hash = hash_password(&new_password)?;
        self.store.update_password_hash(user_id, &password_hash).await?;

        // Outstanding refresh tokens die with the old credential. Access
        // tokens stay valid until their own expiry.
        self.store.revoke_all_before(user_id, Utc::now()).await?;

        tracing::info!(user_id = %user_id, "password changed, prior refresh tokens revoked");
        Ok(())
    }

    /// Soft-delete a user. Their refresh tokens stop working immediately;
    /// outstanding access tokens run out their short expiry.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.store.deactivate_user(user_id).await?;
        self.store.revoke_all_before(user_id, Utc::now()).await?;

        tracing::info!(user_id = %user_id, "user deactivated");
        Ok(())
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<User, AuthError> {
        self.store
            .find_user_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    // ==================== Sessions ====================

    /// Rotate a refresh token: the presented token is consumed and a new
    /// pair is issued. Exactly one concurrent caller wins; every other
    /// presentation of the same token gets [`AuthError::RevokedToken`].
    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh)?;

        if let Some(cutoff) = self.store.watermark(claims.sub).await? {
            if claims.iat <= cutoff.timestamp() {
                return Err(AuthError::RevokedToken);
            }
        }

        let newly_claimed = self
            .store
            .revoke_token(claims.jti, expiry_instant(claims.exp)?)
            .await?;
        if !newly_claimed {
            return Err(AuthError::RevokedToken);
        }

        self.tokens.issue_pair(claims.sub)
    }

    /// Revoke a refresh token. Idempotent: revoking an already-revoked,
    /// expired, or garbage token is a no-op success.
    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        match self.tokens.verify(refresh_token, TokenKind::Refresh) {
            Ok(claims) => {
                self.store
                    .revoke_token(claims.jti, expiry_instant(claims.exp)?)
                    .await?;
                Ok(())
            }
            // A token that cannot mint anything needs no ledger entry.
            Err(AuthError::ExpiredToken) | Err(AuthError::MalformedToken) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Verify an access token and return the subject it was issued to.
    pub fn validate_access_token(&self, access_token: &str) -> Result<Uuid, AuthError> {
        Ok(self.tokens.verify(access_token, TokenKind::Access)?.sub)
    }

    // ==================== Authorization ====================

    /// The one call a protected endpoint makes before proceeding: resolves
    /// the token to a user, the user to a role in the organization, and the
    /// role against the capability table.
    #[tracing::instrument(skip(self, access_token))]
    pub async fn check_access(
        &self,
        access_token: &str,
        org_id: Uuid,
        action: &str,
    ) -> Result<AccessGrant, AuthError> {
        let claims = self.tokens.verify(access_token, TokenKind::Access)?;

        let Some(action) = Action::parse(action) else {
            return Err(AuthError::insufficient("unrecognized action"));
        };

        let Some(role) = self.store.membership_role(org_id, claims.sub).await? else {
            return Err(AuthError::insufficient("not a member of this organization"));
        };

        if !authz::authorize(role, action) {
            return Err(AuthError::insufficient("role does not permit this action"));
        }

        Ok(AccessGrant {
            user_id: claims.sub,
            role,
        })
    }

    // ==================== Organizations ====================

    #[tracing::instrument(skip(self))]
    pub async fn create_org(&self, actor_id: Uuid, name: &str) -> Result<Organization, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::InvalidOrganizationName("name must not be empty"));
        }
        if name.len() > 255 {
            return Err(AuthError::InvalidOrganizationName(
                "name must be at most 255 characters",
            ));
        }
        // Organizations cannot be created on behalf of an unknown user.
        self.get_user(actor_id).await?;

        let org = Organization::new(name.to_string(), actor_id);
        self.store.create_org(&org).await?;

        tracing::info!(org_id = %org.org_id, creator = %actor_id, "organization created");
        Ok(org)
    }

    pub async fn get_org(&self, org_id: Uuid) -> Result<Organization, AuthError> {
        self.store
            .find_org_by_id(org_id)
            .await?
            .ok_or(AuthError::OrganizationNotFound)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_org(&self, actor_id: Uuid, org_id: Uuid) -> Result<(), AuthError> {
        self.store.delete_org(org_id, actor_id).await?;
        tracing::info!(org_id = %org_id, actor = %actor_id, "organization deleted");
        Ok(())
    }

    // ==================== Memberships ====================

    #[tracing::instrument(skip(self))]
    pub async fn add_member(
        &self,
        actor_id: Uuid,
        org_id: Uuid,
        target_user_id: Uuid,
        role: Role,
    ) -> Result<Membership, AuthError> {
        let membership = self
            .store
            .add_member(org_id, actor_id, target_user_id, role)
            .await?;

        tracing::info!(
            org_id = %org_id,
            user_id = %target_user_id,
            role = %role,
            "member added"
        );
        Ok(membership)
    }

    #[tracing::instrument(skip(self))]
    pub async fn change_role(
        &self,
        actor_id: Uuid,
        org_id: Uuid,
        target_user_id: Uuid,
        new_role: Role,
    ) -> Result<Membership, AuthError> {
        let membership = self
            .store
            .change_role(org_id, actor_id, target_user_id, new_role)
            .await?;

        tracing::info!(
            org_id = %org_id,
            user_id = %target_user_id,
            role = %new_role,
            "member role changed"
        );
        Ok(membership)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_member(
        &self,
        actor_id: Uuid,
        org_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<(), AuthError> {
        self.store
            .remove_member(org_id, actor_id, target_user_id)
            .await?;

        tracing::info!(org_id = %org_id, user_id = %target_user_id, "member removed");
        Ok(())
    }

    pub async fn list_members(
        &self,
        actor_id: Uuid,
        org_id: Uuid,
    ) -> Result<Vec<OrgMember>, AuthError> {
        self.store.list_members(org_id, actor_id).await
    }

    pub async fn list_memberships(&self, user_id: Uuid) -> Result<Vec<OrgMembership>, AuthError> {
        self.store.list_memberships_for_user(user_id).await
    }

    // ==================== Maintenance ====================

    /// Drop revocation-ledger entries for tokens that expired longer ago
    /// than the configured retention. Returns the number removed.
    pub async fn prune_expired_tokens(&self) -> Result<u64, AuthError> {
        let cutoff = Utc::now() - Duration::hours(self.revoked_retention_hours);
        let removed = self.store.prune_expired(cutoff).await?;

        if removed > 0 {
            tracing::info!(removed, "pruned expired ledger entries");
        }
        Ok(removed)
    }
}

fn expiry_instant(exp: i64) -> Result<DateTime<Utc>, AuthError> {
    DateTime::<Utc>::from_timestamp(exp, 0).ok_or(AuthError::MalformedToken)
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.is_empty() {
        return Err(AuthError::InvalidEmail("email is required"));
    }
    if email.len() > 255 {
        return Err(AuthError::InvalidEmail(
            "email must be at most 255 characters",
        ));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(AuthError::InvalidEmail("email must not contain whitespace"));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::InvalidEmail("email must contain '@'"));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(AuthError::InvalidEmail("email format is invalid"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("first.last@sub.example.co").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign.example.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@nodot").is_err());
        assert!(validate_email("spaced user@example.com").is_err());

        let long_local = "a".repeat(250);
        assert!(validate_email(&format!("{}@example.com", long_local)).is_err());
    }
}
