//! Membership model - the (user, organization, role) relation and the pure
//! rules governing its mutation.
//!
//! The check functions here are the only place the registry's privilege and
//! last-owner rules live. Store implementations call them from inside their
//! per-organization transaction, passing state read under that transaction's
//! isolation; custom store backends must do the same to honor the contract.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::authz::{self, Action};
use crate::error::AuthError;
use crate::models::organization::Organization;
use crate::models::role::Role;
use crate::models::user::User;

/// Membership entity: one user's standing in one organization.
///
/// The (user_id, org_id) pair is unique; a user holds exactly one role per
/// organization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Membership {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    /// Create a new membership.
    pub fn new(user_id: Uuid, org_id: Uuid, role: Role) -> Self {
        Self {
            user_id,
            org_id,
            role,
            created_at: Utc::now(),
        }
    }
}

/// One entry of a user's own membership listing.
#[derive(Debug, Clone, Serialize)]
pub struct OrgMembership {
    pub organization: Organization,
    pub role: Role,
}

/// One entry of an organization's member listing.
#[derive(Debug, Clone, Serialize)]
pub struct OrgMember {
    pub user: User,
    pub role: Role,
}

/// Rule check for adding a member.
///
/// `target_role` is the target's existing role in the organization, if any;
/// an existing membership is a conflict regardless of its role.
pub fn check_add_member(
    actor_role: Option<Role>,
    target_role: Option<Role>,
    new_role: Role,
) -> Result<(), AuthError> {
    let actor = actor_role.ok_or(AuthError::insufficient(
        "not a member of this organization",
    ))?;
    if actor < Role::Admin {
        return Err(AuthError::insufficient("adding members requires admin"));
    }
    if new_role > actor {
        return Err(AuthError::insufficient(
            "cannot grant a role above your own",
        ));
    }
    if target_role.is_some() {
        return Err(AuthError::DuplicateMembership);
    }
    Ok(())
}

/// Rule check for changing a member's role.
///
/// `owner_count` is the number of OWNER memberships in the organization,
/// read under the same isolation as the roles.
pub fn check_change_role(
    actor_role: Option<Role>,
    target_role: Option<Role>,
    new_role: Role,
    owner_count: u32,
) -> Result<(), AuthError> {
    let actor = actor_role.ok_or(AuthError::insufficient(
        "not a member of this organization",
    ))?;
    if actor < Role::Admin {
        return Err(AuthError::insufficient("role changes require admin"));
    }
    if new_role > actor {
        return Err(AuthError::insufficient(
            "cannot grant a role above your own",
        ));
    }
    let target = target_role.ok_or(AuthError::MembershipNotFound)?;
    if target == Role::Owner && actor < Role::Owner {
        return Err(AuthError::insufficient(
            "only an owner may change an owner's role",
        ));
    }
    if target == Role::Owner && new_role < Role::Owner && owner_count <= 1 {
        return Err(AuthError::LastOwnerViolation);
    }
    Ok(())
}

/// Rule check for removing a member.
///
/// Self-removal (`self_removal = true`) skips the admin floor: any member may
/// leave, subject to the last-owner invariant.
pub fn check_remove_member(
    actor_role: Option<Role>,
    target_role: Option<Role>,
    owner_count: u32,
    self_removal: bool,
) -> Result<(), AuthError> {
    let actor = actor_role.ok_or(AuthError::insufficient(
        "not a member of this organization",
    ))?;
    if !self_removal && actor < Role::Admin {
        return Err(AuthError::insufficient("removing members requires admin"));
    }
    let target = target_role.ok_or(AuthError::MembershipNotFound)?;
    if target == Role::Owner && actor < Role::Owner {
        return Err(AuthError::insufficient("only an owner may remove an owner"));
    }
    if target == Role::Owner && owner_count <= 1 {
        return Err(AuthError::LastOwnerViolation);
    }
    Ok(())
}

/// Rule check for enumerating an organization's members: any membership
/// suffices, non-members cannot enumerate.
pub fn check_list_members(actor_role: Option<Role>) -> Result<(), AuthError> {
    if actor_role.is_none() {
        return Err(AuthError::insufficient(
            "not a member of this organization",
        ));
    }
    Ok(())
}

/// Rule check for deleting an organization, via the capability table.
pub fn check_delete_org(actor_role: Option<Role>) -> Result<(), AuthError> {
    match actor_role {
        Some(role) if authz::authorize(role, Action::DeleteOrg) => Ok(()),
        Some(_) => Err(AuthError::insufficient(
            "deleting the organization requires owner",
        )),
        None => Err(AuthError::insufficient(
            "not a member of this organization",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_cannot_add() {
        let err = check_add_member(Some(Role::Member), None, Role::Viewer).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientRole { .. }));
    }

    #[test]
    fn test_non_member_cannot_add() {
        let err = check_add_member(None, None, Role::Viewer).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientRole { .. }));
    }

    #[test]
    fn test_admin_can_add_up_to_admin() {
        assert!(check_add_member(Some(Role::Admin), None, Role::Viewer).is_ok());
        assert!(check_add_member(Some(Role::Admin), None, Role::Member).is_ok());
        assert!(check_add_member(Some(Role::Admin), None, Role::Admin).is_ok());
    }

    #[test]
    fn test_only_owner_grants_owner() {
        let err = check_add_member(Some(Role::Admin), None, Role::Owner).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientRole { .. }));
        assert!(check_add_member(Some(Role::Owner), None, Role::Owner).is_ok());
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let err = check_add_member(Some(Role::Owner), Some(Role::Viewer), Role::Member).unwrap_err();
        assert!(matches!(err, AuthError::DuplicateMembership));
    }

    #[test]
    fn test_change_role_requires_admin() {
        let err =
            check_change_role(Some(Role::Member), Some(Role::Viewer), Role::Member, 1).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientRole { .. }));
    }

    #[test]
    fn test_change_role_missing_target() {
        let err = check_change_role(Some(Role::Owner), None, Role::Member, 1).unwrap_err();
        assert!(matches!(err, AuthError::MembershipNotFound));
    }

    #[test]
    fn test_admin_cannot_touch_owner() {
        let err =
            check_change_role(Some(Role::Admin), Some(Role::Owner), Role::Admin, 2).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientRole { .. }));

        let err = check_remove_member(Some(Role::Admin), Some(Role::Owner), 2, false).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientRole { .. }));
    }

    #[test]
    fn test_demoting_last_owner_rejected() {
        let err =
            check_change_role(Some(Role::Owner), Some(Role::Owner), Role::Admin, 1).unwrap_err();
        assert!(matches!(err, AuthError::LastOwnerViolation));
    }

    #[test]
    fn test_demoting_one_of_two_owners_allowed() {
        assert!(check_change_role(Some(Role::Owner), Some(Role::Owner), Role::Admin, 2).is_ok());
    }

    #[test]
    fn test_removing_last_owner_rejected_even_as_self() {
        let err = check_remove_member(Some(Role::Owner), Some(Role::Owner), 1, true).unwrap_err();
        assert!(matches!(err, AuthError::LastOwnerViolation));
    }

    #[test]
    fn test_member_may_leave() {
        assert!(check_remove_member(Some(Role::Member), Some(Role::Member), 1, true).is_ok());
        assert!(check_remove_member(Some(Role::Viewer), Some(Role::Viewer), 1, true).is_ok());
    }

    #[test]
    fn test_member_cannot_remove_others() {
        let err =
            check_remove_member(Some(Role::Member), Some(Role::Viewer), 1, false).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientRole { .. }));
    }

    #[test]
    fn test_owner_self_removal_with_replacement_allowed() {
        assert!(check_remove_member(Some(Role::Owner), Some(Role::Owner), 2, true).is_ok());
    }

    #[test]
    fn test_list_members_requires_membership() {
        assert!(check_list_members(Some(Role::Viewer)).is_ok());
        let err = check_list_members(None).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientRole { .. }));
    }

    #[test]
    fn test_delete_org_requires_owner() {
        assert!(check_delete_org(Some(Role::Owner)).is_ok());
        assert!(check_delete_org(Some(Role::Admin)).is_err());
        assert!(check_delete_org(None).is_err());
    }
}
