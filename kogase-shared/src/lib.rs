//! # Kogase Shared Library
//!
//! Domain logic behind the Kogase telemetry API: persistence, credentials,
//! project access control, event ingestion and analytics queries.
//!
//! ## Module Organization
//!
//! - `db`: connection pool and embedded migrations
//! - `models`: database models and data structures
//! - `auth`: passwords, JWTs, API keys, principals and the access-control resolver
//! - `ingest`: device registry and the transactional ingestion pipeline
//! - `analytics`: filtered, paginated read queries

pub mod analytics;
pub mod auth;
pub mod db;
pub mod ingest;
pub mod models;

/// Current version of the Kogase shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
