//! Utility functions for the gatehouse engine.

pub mod password;

pub use password::{Password, PasswordHashString};
