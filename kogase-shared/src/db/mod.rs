/// Database layer
///
/// - `pool`: PostgreSQL connection pool with health checks
/// - `migrations`: embedded schema migrations
///
/// Row types and their queries live in the crate-level `models` module.

pub mod migrations;
pub mod pool;
