//! Multi-tenant identity and access-control engine.
//!
//! Accounts authenticate with email and password and receive a short-lived
//! access token plus a rotating refresh token. Organizations carry role-based
//! memberships (`Owner > Admin > Member > Viewer`), and every protected
//! action resolves through one call: [`AuthService::check_access`].
//!
//! The engine is transport-agnostic. Embed it behind whatever surface the
//! deployment needs and pick a [`store`] backend: [`PgStore`] for PostgreSQL
//! or [`MemoryStore`] for tests and single-process use.

pub mod authz;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::GatehouseConfig;
pub use error::AuthError;
pub use models::{Membership, OrgMember, OrgMembership, Organization, Role, User};
pub use services::{
    extract_bearer, AccessGrant, AuthService, AuthSession, Claims, TokenKind, TokenPair,
    TokenService,
};
pub use store::{GatehouseStore, MemoryStore, OrgStore, PgStore, RevocationLedger, UserStore};
pub use utils::{Password, PasswordHashString};
