/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: bind address (default: 0.0.0.0:5001)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `CORS_ORIGINS`: comma-separated origins, `*` for permissive (default: http://localhost:3000)
/// - `PRODUCTION`: enables HSTS (default: false)
/// - `SESSION_TTL_SECS`: absolute session lifetime (default: 3600)
/// - `SESSION_COOKIE_SECURE`: adds `Secure` to the session cookie (default: false)
/// - `ALLOWED_EMAIL_DOMAINS`: comma-separated, empty allows any domain (default: nyu.edu)
/// - `BREVO_API_KEY`: enables Brevo delivery; unset logs codes instead
/// - `BREVO_SENDER_EMAIL` / `BREVO_SENDER_NAME`: sender identity
/// - `EMAIL_TIMEOUT_SECS`: email provider timeout (default: 10)
/// - `REDIS_URL`: enables Redis rate limiting; unset keeps counters in process
/// - `SWEEP_INTERVAL_SECS`: expiry sweeper period (default: 300)
/// - `RUST_LOG`: log filter
///
/// # Example
///
/// ```no_run
/// use techtreks_api::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Session and registration settings
    pub auth: AuthConfig,

    /// Verification email delivery
    pub email: EmailConfig,

    /// Rate limiter backend
    pub rate_limit: RateLimitConfig,

    /// Seconds between expiry sweeps
    pub sweep_interval_secs: u64,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins (`*` = permissive)
    pub cors_origins: Vec<String>,

    /// Production mode (enables HSTS)
    pub production: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Absolute lifetime of a login session
    pub session_ttl_secs: u64,

    /// Mark the session cookie `Secure` (serve over HTTPS)
    pub session_cookie_secure: bool,

    /// Email domains allowed to register; empty allows any
    pub allowed_email_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Brevo API key; `None` selects the log-only dispatcher
    #[serde(skip_serializing)]
    pub brevo_api_key: Option<String>,

    pub sender_email: String,

    pub sender_name: String,

    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Redis URL; `None` keeps counters in process
    pub redis_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `DATABASE_URL` is missing
    /// - A numeric or boolean variable has an invalid value
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let session_ttl_secs: u64 = parse_var("SESSION_TTL_SECS", 3600)?;
        if session_ttl_secs == 0 {
            anyhow::bail!("SESSION_TTL_SECS must be greater than zero");
        }

        let sweep_interval_secs: u64 = parse_var("SWEEP_INTERVAL_SECS", 300)?;
        if sweep_interval_secs == 0 {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("API_PORT", 5001)?,
                cors_origins: parse_list(
                    &env::var("CORS_ORIGINS")
                        .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                ),
                production: parse_bool("PRODUCTION", false)?,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            auth: AuthConfig {
                session_ttl_secs,
                session_cookie_secure: parse_bool("SESSION_COOKIE_SECURE", false)?,
                allowed_email_domains: parse_list(
                    &env::var("ALLOWED_EMAIL_DOMAINS").unwrap_or_else(|_| "nyu.edu".to_string()),
                ),
            },
            email: EmailConfig {
                brevo_api_key: non_empty_var("BREVO_API_KEY"),
                sender_email: env::var("BREVO_SENDER_EMAIL")
                    .unwrap_or_else(|_| "noreply@techtreks.com".to_string()),
                sender_name: env::var("BREVO_SENDER_NAME")
                    .unwrap_or_else(|_| "TechTreks".to_string()),
                timeout_secs: parse_var("EMAIL_TIMEOUT_SECS", 10)?,
            },
            rate_limit: RateLimitConfig {
                redis_url: non_empty_var("REDIS_URL"),
            },
            sweep_interval_secs,
        })
    }

    /// Configuration for tests and local tooling: no database URL, in-process
    /// backends, any email domain allowed unless overridden.
    pub fn for_tests() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors_origins: vec!["http://localhost:3000".to_string()],
                production: false,
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 1,
            },
            auth: AuthConfig {
                session_ttl_secs: 3600,
                session_cookie_secure: false,
                allowed_email_domains: vec!["nyu.edu".to_string()],
            },
            email: EmailConfig {
                brevo_api_key: None,
                sender_email: "noreply@techtreks.com".to_string(),
                sender_name: "TechTreks".to_string(),
                timeout_secs: 10,
            },
            rate_limit: RateLimitConfig { redis_url: None },
            sweep_interval_secs: 300,
        }
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

/// Splits a comma-separated list, trimming entries and dropping empty ones
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value {:?}: {}", name, raw, e)),
        None => Ok(default),
    }
}

fn parse_bool(name: &str, default: bool) -> anyhow::Result<bool> {
    match non_empty_var(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("{} must be a boolean, got {:?}", name, raw),
        },
        None => Ok(default),
    }
}
