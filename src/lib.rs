// API-key-authenticated, per-key rate-limited gate for sports match data.

pub mod database;
pub mod errors;
pub mod gate;
pub mod models;
pub mod rate_limit;
pub mod security;
pub mod usage;

// Re-export commonly used items
pub use database::Database;
pub use errors::AuthError;
pub use gate::{Admission, AuthGate};
pub use models::{ApiKeyRecord, SportScope};
pub use rate_limit::RateLimiter;
pub use security::{generate_api_key, hash_api_key, KeyStore};
pub use usage::UsageRecorder;
