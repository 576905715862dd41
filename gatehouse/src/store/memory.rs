//! In-memory backend for tests and embedded use.
//!
//! A single mutex over the relational state stands in for the per-organization
//! transaction boundary: coarser than the PostgreSQL row lock, but it gives the
//! same guarantee that policy checks and the write they guard are atomic. The
//! ledger sits outside the mutex since its operations are single-key.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gatehouse_core::StoreError;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::{
    membership, Membership, OrgMember, OrgMembership, Organization, Role, User, UserCredentials,
};
use crate::utils::PasswordHashString;

use super::{OrgStore, RevocationLedger, UserStore};

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    revoked: DashMap<Uuid, DateTime<Utc>>,
    watermarks: DashMap<Uuid, DateTime<Utc>>,
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<Uuid, User>,
    credentials: HashMap<Uuid, String>,
    orgs: HashMap<Uuid, Organization>,
    memberships: HashMap<(Uuid, Uuid), Membership>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryInner {
    fn role_of(&self, org_id: Uuid, user_id: Uuid) -> Option<Role> {
        self.memberships.get(&(org_id, user_id)).map(|m| m.role)
    }

    fn owner_count(&self, org_id: Uuid) -> u32 {
        self.memberships
            .values()
            .filter(|m| m.org_id == org_id && m.role == Role::Owner)
            .count() as u32
    }

    fn user_by_email(&self, email: &str) -> Option<&User> {
        let lowered = email.to_lowercase();
        self.users
            .values()
            .find(|u| u.email.to_lowercase() == lowered)
    }
}

// ==================== User Operations ====================

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(
        &self,
        user: &User,
        password_hash: &PasswordHashString,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;

        if inner.user_by_email(&user.email).is_some() {
            return Err(AuthError::EmailAlreadyRegistered);
        }

        inner.users.insert(user.user_id, user.clone());
        inner
            .credentials
            .insert(user.user_id, password_hash.as_str().to_string());
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let inner = self.inner.lock().await;
        Ok(inner.user_by_email(email).cloned())
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, AuthError> {
        let inner = self.inner.lock().await;

        let Some(user) = inner.user_by_email(email) else {
            return Ok(None);
        };
        let hash = inner
            .credentials
            .get(&user.user_id)
            .ok_or_else(|| credentials_missing(user.user_id))?;

        Ok(Some(UserCredentials {
            user_id: user.user_id,
            password_hash: hash.clone(),
            is_active: user.is_active,
        }))
    }

    async fn find_credentials_by_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserCredentials>, AuthError> {
        let inner = self.inner.lock().await;

        let Some(user) = inner.users.get(&user_id) else {
            return Ok(None);
        };
        let hash = inner
            .credentials
            .get(&user_id)
            .ok_or_else(|| credentials_missing(user_id))?;

        Ok(Some(UserCredentials {
            user_id,
            password_hash: hash.clone(),
            is_active: user.is_active,
        }))
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &PasswordHashString,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;

        match inner.credentials.get_mut(&user_id) {
            Some(hash) => {
                *hash = password_hash.as_str().to_string();
                Ok(())
            }
            None => Err(AuthError::UserNotFound),
        }
    }

    async fn deactivate_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;

        match inner.users.get_mut(&user_id) {
            Some(user) => {
                user.is_active = false;
                Ok(())
            }
            None => Err(AuthError::UserNotFound),
        }
    }
}

// ==================== Organization Operations ====================

#[async_trait]
impl OrgStore for MemoryStore {
    async fn create_org(&self, org: &Organization) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;

        if inner.orgs.values().any(|o| o.name == org.name) {
            return Err(AuthError::DuplicateOrganization);
        }

        inner.orgs.insert(org.org_id, org.clone());
        let owner = Membership::new(org.created_by, org.org_id, Role::Owner);
        inner
            .memberships
            .insert((org.org_id, org.created_by), owner);
        Ok(())
    }

    async fn find_org_by_id(&self, org_id: Uuid) -> Result<Option<Organization>, AuthError> {
        let inner = self.inner.lock().await;
        Ok(inner.orgs.get(&org_id).cloned())
    }

    async fn delete_org(&self, org_id: Uuid, actor_id: Uuid) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;

        if !inner.orgs.contains_key(&org_id) {
            return Err(AuthError::OrganizationNotFound);
        }
        membership::check_delete_org(inner.role_of(org_id, actor_id))?;

        inner.orgs.remove(&org_id);
        inner.memberships.retain(|(mid, _), _| *mid != org_id);
        Ok(())
    }

    async fn membership_role(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Role>, AuthError> {
        let inner = self.inner.lock().await;
        Ok(inner.role_of(org_id, user_id))
    }

    async fn add_member(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
        role: Role,
    ) -> Result<Membership, AuthError> {
        let mut inner = self.inner.lock().await;

        if !inner.orgs.contains_key(&org_id) {
            return Err(AuthError::OrganizationNotFound);
        }
        let actor_role = inner.role_of(org_id, actor_id);
        let target_role = inner.role_of(org_id, target_user_id);
        membership::check_add_member(actor_role, target_role, role)?;

        if !inner.users.contains_key(&target_user_id) {
            return Err(AuthError::UserNotFound);
        }

        let created = Membership::new(target_user_id, org_id, role);
        inner
            .memberships
            .insert((org_id, target_user_id), created.clone());
        Ok(created)
    }

    async fn change_role(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
        new_role: Role,
    ) -> Result<Membership, AuthError> {
        let mut inner = self.inner.lock().await;

        if !inner.orgs.contains_key(&org_id) {
            return Err(AuthError::OrganizationNotFound);
        }
        let actor_role = inner.role_of(org_id, actor_id);
        let target_role = inner.role_of(org_id, target_user_id);
        let owner_count = inner.owner_count(org_id);
        membership::check_change_role(actor_role, target_role, new_role, owner_count)?;

        let entry = inner
            .memberships
            .get_mut(&(org_id, target_user_id))
            .ok_or(AuthError::MembershipNotFound)?;
        entry.role = new_role;
        Ok(entry.clone())
    }

    async fn remove_member(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;

        if !inner.orgs.contains_key(&org_id) {
            return Err(AuthError::OrganizationNotFound);
        }
        let actor_role = inner.role_of(org_id, actor_id);
        let target_role = inner.role_of(org_id, target_user_id);
        let owner_count = inner.owner_count(org_id);
        let self_removal = actor_id == target_user_id;
        membership::check_remove_member(actor_role, target_role, owner_count, self_removal)?;

        inner.memberships.remove(&(org_id, target_user_id));
        Ok(())
    }

    async fn list_members(
        &self,
        org_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Vec<OrgMember>, AuthError> {
        let inner = self.inner.lock().await;

        if !inner.orgs.contains_key(&org_id) {
            return Err(AuthError::OrganizationNotFound);
        }
        membership::check_list_members(inner.role_of(org_id, actor_id))?;

        let mut memberships: Vec<&Membership> = inner
            .memberships
            .values()
            .filter(|m| m.org_id == org_id)
            .collect();
        memberships.sort_by_key(|m| m.created_at);

        memberships
            .into_iter()
            .map(|m| {
                let user = inner
                    .users
                    .get(&m.user_id)
                    .cloned()
                    .ok_or_else(|| member_user_missing(m.user_id))?;
                Ok(OrgMember { user, role: m.role })
            })
            .collect()
    }

    async fn list_memberships_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrgMembership>, AuthError> {
        let inner = self.inner.lock().await;

        let mut memberships: Vec<&Membership> = inner
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .collect();
        memberships.sort_by_key(|m| m.created_at);

        memberships
            .into_iter()
            .map(|m| {
                let organization = inner
                    .orgs
                    .get(&m.org_id)
                    .cloned()
                    .ok_or_else(|| member_org_missing(m.org_id))?;
                Ok(OrgMembership {
                    organization,
                    role: m.role,
                })
            })
            .collect()
    }
}

// ==================== Revocation Ledger Operations ====================

#[async_trait]
impl RevocationLedger for MemoryStore {
    async fn revoke_token(
        &self,
        token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        // insert returns the previous value, which makes this the atomic
        // claim: exactly one concurrent caller sees None.
        Ok(self.revoked.insert(token_id, expires_at).is_none())
    }

    async fn is_revoked(&self, token_id: Uuid) -> Result<bool, AuthError> {
        Ok(self.revoked.contains_key(&token_id))
    }

    async fn revoke_all_before(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        match self.watermarks.entry(user_id) {
            Entry::Occupied(mut occupied) => {
                if cutoff > *occupied.get() {
                    occupied.insert(cutoff);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(cutoff);
            }
        }
        Ok(())
    }

    async fn watermark(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>, AuthError> {
        Ok(self.watermarks.get(&user_id).map(|entry| *entry.value()))
    }

    async fn prune_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError> {
        let before = self.revoked.len();
        self.revoked.retain(|_, expires_at| *expires_at >= cutoff);
        Ok(before.saturating_sub(self.revoked.len()) as u64)
    }
}

fn credentials_missing(user_id: Uuid) -> AuthError {
    AuthError::Store(StoreError::corrupt(anyhow::anyhow!(
        "user {} has no credential record",
        user_id
    )))
}

fn member_user_missing(user_id: Uuid) -> AuthError {
    AuthError::Store(StoreError::corrupt(anyhow::anyhow!(
        "membership references missing user {}",
        user_id
    )))
}

fn member_org_missing(org_id: Uuid) -> AuthError {
    AuthError::Store(StoreError::corrupt(anyhow::anyhow!(
        "membership references missing organization {}",
        org_id
    )))
}
