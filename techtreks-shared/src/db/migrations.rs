/// Schema migrations
///
/// SQL migrations live in `migrations/` at the workspace root and are
/// embedded into the binary at compile time by `sqlx::migrate!`. Each file is
/// named `{timestamp}_{name}.sql`:
///
/// - `create_users`: confirmed accounts
/// - `create_pending_verifications`: registrations awaiting their code
/// - `create_sessions`: login sessions keyed by token digest
/// - `create_messages`: direct messages
///
/// # Example
///
/// ```no_run
/// use techtreks_shared::db::pool::{create_pool, DatabaseConfig};
/// use techtreks_shared::db::migrations::{ensure_database_exists, run_migrations};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let url = std::env::var("DATABASE_URL")?;
///     ensure_database_exists(&url).await?;
///
///     let pool = create_pool(DatabaseConfig { url, ..Default::default() }).await?;
///     run_migrations(&pool).await?;
///     Ok(())
/// }
/// ```

use sqlx::{migrate::MigrateDatabase, postgres::PgPool, Postgres};
use tracing::{debug, info, warn};

/// Applies every migration not yet recorded in `_sqlx_migrations`
///
/// Each migration runs in its own transaction; a failing one is rolled back
/// and stops the run.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Running database migrations");

    match sqlx::migrate!("../migrations").run(pool).await {
        Ok(()) => {
            info!("Database schema is up to date");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Migration failed");
            Err(e)
        }
    }
}

/// Number of migrations shipped with this build
pub fn embedded_migration_count() -> usize {
    sqlx::migrate!("../migrations").iter().count()
}

/// Creates the database named in `database_url` if it is missing
///
/// Meant for development and tests; production databases are provisioned
/// separately.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), sqlx::Error> {
    if Postgres::database_exists(database_url).await? {
        debug!("Database already exists");
    } else {
        info!("Database does not exist, creating it");
        Postgres::create_database(database_url).await?;
    }

    Ok(())
}
