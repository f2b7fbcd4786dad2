//! # TechTreks Shared Library
//!
//! Domain logic of the TechTreks marketplace backend, independent of HTTP.
//!
//! ## Module Organization
//!
//! - `auth`: registration with email verification, login sessions, passwords
//! - `messaging`: direct messages between verified users
//! - `products`: marketplace listings owned by their seller
//! - `models`: database rows and their SQL
//! - `store`: repository traits with PostgreSQL and in-memory backends
//! - `email`: verification email delivery
//! - `rate_limit`: fixed-window request limiting
//! - `db`: connection pool and migrations

pub mod auth;
pub mod db;
pub mod email;
pub mod messaging;
pub mod models;
pub mod products;
pub mod rate_limit;
pub mod store;

/// Current version of the TechTreks shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
