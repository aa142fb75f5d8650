mod from_row;
mod schema;
pub mod queries;

pub use schema::{init_audit_db, init_db};

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::crypto::MasterKey;
use crate::email::EmailService;
use crate::rate_limit::RateLimiter;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding database pools and configuration
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (companies, persons, courses, credentials, etc.)
    pub db: DbPool,
    /// Audit log database pool (separate file to isolate growth)
    pub audit: DbPool,
    /// Master key for envelope encryption of secrets at rest
    pub master_key: MasterKey,
    /// Outbound notification sender (no-op when unconfigured)
    pub email_service: EmailService,
    /// Failed-attempt limiter for the product-license validation endpoint
    pub limiter: Arc<dyn RateLimiter>,
    /// Shared secret expected in x-api-key on the bransjekurs webhook
    pub webhook_api_key: Option<String>,
    pub audit_log_enabled: bool,
    /// Base URL for links in notifications (e.g., https://admin.kks.no)
    pub base_url: String,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    // Enforced per connection; GDPR erasure relies on ON DELETE CASCADE.
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    Pool::builder().max_size(10).build(manager)
}
