//! Authorization engine - the static capability table over roles.
//!
//! Pure and total: no state, no storage, no side effects. The table here and
//! the role order in [`Role`] are the single source of truth for every
//! access decision in the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::Role;

/// Actions a caller can request against an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    ViewOrg,
    EditOrg,
    AddMember,
    ChangeRole,
    RemoveMember,
    DeleteOrg,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::ViewOrg,
        Action::EditOrg,
        Action::AddMember,
        Action::ChangeRole,
        Action::RemoveMember,
        Action::DeleteOrg,
    ];

    /// Wire encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ViewOrg => "view-org",
            Action::EditOrg => "edit-org",
            Action::AddMember => "add-member",
            Action::ChangeRole => "change-role",
            Action::RemoveMember => "remove-member",
            Action::DeleteOrg => "delete-org",
        }
    }

    /// Boundary parser for action labels. Unknown labels yield `None`, which
    /// callers must treat as a deny; nothing outside the table is ever
    /// allowed.
    pub fn parse(label: &str) -> Option<Action> {
        match label {
            "view-org" => Some(Action::ViewOrg),
            "edit-org" => Some(Action::EditOrg),
            "add-member" => Some(Action::AddMember),
            "change-role" => Some(Action::ChangeRole),
            "remove-member" => Some(Action::RemoveMember),
            "delete-org" => Some(Action::DeleteOrg),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum role required for an action (the capability table).
pub fn required_role(action: Action) -> Role {
    match action {
        Action::ViewOrg => Role::Viewer,
        Action::EditOrg => Role::Admin,
        Action::AddMember => Role::Admin,
        Action::ChangeRole => Role::Admin,
        Action::RemoveMember => Role::Admin,
        Action::DeleteOrg => Role::Owner,
    }
}

/// Pure allow/deny decision: allow iff `role` meets the action's minimum in
/// the total privilege order.
pub fn authorize(role: Role, action: Action) -> bool {
    role >= required_role(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_matches_rank_comparison() {
        for role in Role::ALL {
            for action in Action::ALL {
                let expected = role.rank() >= required_role(action).rank();
                assert_eq!(
                    authorize(role, action),
                    expected,
                    "{role} / {action} diverged from the rank comparison"
                );
            }
        }
    }

    #[test]
    fn test_viewer_can_only_view() {
        assert!(authorize(Role::Viewer, Action::ViewOrg));
        assert!(!authorize(Role::Viewer, Action::EditOrg));
        assert!(!authorize(Role::Viewer, Action::AddMember));
        assert!(!authorize(Role::Viewer, Action::DeleteOrg));
    }

    #[test]
    fn test_member_cannot_manage_members() {
        assert!(authorize(Role::Member, Action::ViewOrg));
        assert!(!authorize(Role::Member, Action::AddMember));
        assert!(!authorize(Role::Member, Action::ChangeRole));
        assert!(!authorize(Role::Member, Action::RemoveMember));
    }

    #[test]
    fn test_admin_cannot_delete_org() {
        assert!(authorize(Role::Admin, Action::EditOrg));
        assert!(authorize(Role::Admin, Action::AddMember));
        assert!(!authorize(Role::Admin, Action::DeleteOrg));
    }

    #[test]
    fn test_owner_is_allowed_everything() {
        for action in Action::ALL {
            assert!(authorize(Role::Owner, action));
        }
    }

    #[test]
    fn test_action_label_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::parse(action.as_str()), Some(action));
        }
    }

    #[test]
    fn test_unknown_action_label_is_none() {
        assert_eq!(Action::parse("drop-table"), None);
        assert_eq!(Action::parse("view_org"), None);
        assert_eq!(Action::parse(""), None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: privilege is monotonic. Any action allowed to a
            /// role is allowed to every role that outranks it.
            #[test]
            fn allowed_actions_grow_with_rank(
                lower in prop::sample::select(&Role::ALL[..]),
                higher in prop::sample::select(&Role::ALL[..]),
                action in prop::sample::select(&Action::ALL[..]),
            ) {
                prop_assume!(lower <= higher);
                if authorize(lower, action) {
                    prop_assert!(authorize(higher, action));
                }
            }
        }
    }
}
