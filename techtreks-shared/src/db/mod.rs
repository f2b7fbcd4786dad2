/// Database layer for TechTreks
///
/// - `pool`: PostgreSQL connection pool with a startup health check
/// - `migrations`: embedded schema migrations
///
/// Table access lives in `models` (SQL per table) and `store::PgStore`
/// (transactions across tables).

pub mod migrations;
pub mod pool;
