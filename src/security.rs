use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::database::Database;
use crate::errors::AuthError;
use crate::models::{ApiKeyRecord, SportScope};

/// All keys carry the same prefix; the first 12 characters are stored
/// verbatim for display ("sk_live_a1b2").
pub const KEY_PREFIX: &str = "sk_live_";

const DISPLAY_PREFIX_LEN: usize = 12;
const SECRET_BYTES: usize = 32;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct GeneratedKey {
    /// Full plaintext key, shown once at creation.
    pub plain: String,
    /// SHA-256 hex digest, the only form ever persisted.
    pub hash: String,
    /// Non-secret display fragment.
    pub prefix: String,
}

/// Generates a 256-bit API key: "sk_live_" + base64url(32 random bytes).
pub fn generate_api_key() -> GeneratedKey {
    let mut rng = rand::thread_rng();
    let mut random_bytes = [0u8; SECRET_BYTES];
    rng.fill(&mut random_bytes);

    let plain = format!("{}{}", KEY_PREFIX, URL_SAFE_NO_PAD.encode(random_bytes));
    let hash = hash_api_key(&plain);
    let prefix = plain[..DISPLAY_PREFIX_LEN].to_string();

    GeneratedKey { plain, hash, prefix }
}

/// Digest of a presented credential. Lookups go through this digest only, so
/// no comparison ever runs over the raw secret.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

struct CacheEntry {
    record: ApiKeyRecord,
    fetched_at: Instant,
}

/// Resolves presented credentials to stored key records.
///
/// A short-TTL read-through cache keyed by digest avoids a storage round-trip
/// per request. Revocation through this store invalidates the cached entry in
/// the same call, so a revoked key never rides out the TTL.
#[derive(Clone)]
pub struct KeyStore {
    db: Database,
    cache: Arc<Mutex<HashMap<String, CacheEntry>>>,
    cache_ttl: Duration,
}

impl KeyStore {
    pub fn new(db: Database) -> Self {
        Self::with_cache_ttl(db, DEFAULT_CACHE_TTL)
    }

    pub fn with_cache_ttl(db: Database, cache_ttl: Duration) -> Self {
        Self {
            db,
            cache: Arc::new(Mutex::new(HashMap::new())),
            cache_ttl,
        }
    }

    /// Resolves a raw credential to its record, or the reason it is not
    /// admissible. A key past `expires_at` is denied even while
    /// `is_active` is still set.
    pub fn resolve(&self, raw_credential: &str) -> Result<ApiKeyRecord, AuthError> {
        let key_hash = hash_api_key(raw_credential);
        let record = match self.cached(&key_hash) {
            Some(record) => record,
            None => {
                let record = self.db.find_by_key_hash(&key_hash)?;
                self.insert_cache(record.clone());
                record
            }
        };

        if !record.is_active {
            return Err(AuthError::Revoked);
        }
        if record.is_expired(Utc::now()) {
            return Err(AuthError::Expired);
        }
        Ok(record)
    }

    pub fn create(
        &self,
        name: &str,
        sports: SportScope,
        rate_limit_per_minute: u32,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(GeneratedKey, ApiKeyRecord), AuthError> {
        if rate_limit_per_minute == 0 {
            return Err(AuthError::InvalidRequest(
                "rate limit must be at least 1 request per minute".to_string(),
            ));
        }
        let generated = generate_api_key();
        let record = self.db.create_api_key(
            &generated.hash,
            &generated.prefix,
            name,
            &sports,
            rate_limit_per_minute,
            expires_at,
        )?;
        Ok((generated, record))
    }

    /// Soft-retires a key and drops it from the cache so the next request
    /// observes the revocation immediately.
    pub fn revoke(&self, id: i64) -> Result<(), AuthError> {
        let key_hash = self.db.revoke_api_key(id)?;
        self.invalidate(&key_hash);
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<ApiKeyRecord>, AuthError> {
        self.db.list_api_keys()
    }

    pub fn invalidate(&self, key_hash: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(key_hash);
        }
    }

    fn cached(&self, key_hash: &str) -> Option<ApiKeyRecord> {
        let cache = self.cache.lock().ok()?;
        let entry = cache.get(key_hash)?;
        if entry.fetched_at.elapsed() > self.cache_ttl {
            return None;
        }
        Some(entry.record.clone())
    }

    fn insert_cache(&self, record: ApiKeyRecord) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(
                record.key_hash.clone(),
                CacheEntry {
                    record,
                    fetched_at: Instant::now(),
                },
            );
        }
    }
}
