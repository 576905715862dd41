//! Services layer for the gatehouse engine.
//!
//! The token service handles signing and verification; the auth service is
//! the facade everything else calls.

mod auth;
mod token;

pub use auth::{AccessGrant, AuthService, AuthSession};
pub use token::{extract_bearer, Claims, TokenKind, TokenPair, TokenService};
