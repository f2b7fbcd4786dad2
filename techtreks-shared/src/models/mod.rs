/// Database models for TechTreks
///
/// Each model owns the SQL for its table. The functions are generic over
/// [`sqlx::PgExecutor`] so `store::postgres::PgStore` can compose them inside
/// a single transaction.
///
/// # Models
///
/// - `user`: Verified user accounts
/// - `pending_verification`: Registrations awaiting the emailed code
/// - `session`: Server-side login sessions
/// - `message`: Direct messages between users
/// - `product`: Marketplace listings owned by their seller

pub mod message;
pub mod pending_verification;
pub mod product;
pub mod session;
pub mod user;
