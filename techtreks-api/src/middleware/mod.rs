/// Middleware modules for the API server
///
/// - `security`: security headers on every response
/// - `rate_limit`: per-client fixed-window limits per route
/// - `session`: session cookie extraction and `Set-Cookie` construction

pub mod rate_limit;
pub mod security;
pub mod session;
