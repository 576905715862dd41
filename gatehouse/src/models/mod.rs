//! Domain models for the gatehouse engine.

pub mod membership;
pub mod organization;
pub mod role;
pub mod user;

pub use membership::{Membership, OrgMember, OrgMembership};
pub use organization::Organization;
pub use role::{ParseRoleError, Role};
pub use user::{User, UserCredentials};
