use chrono::Utc;

use crate::errors::AuthError;
use crate::rate_limit::RateLimiter;
use crate::security::KeyStore;
use crate::usage::UsageRecorder;

/// A successful admission decision. Carries the key's quota state so the
/// HTTP layer can surface rate-limit headers without a second lookup.
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    pub key_id: i64,
    pub rate_limit_per_minute: u32,
    pub remaining: u32,
}

/// Single admission point: credential -> record -> scope -> quota.
///
/// Short-circuits on the first failure so every denial carries exactly one
/// reason. On success the usage touch is fired and forgotten; its outcome
/// never affects the decision.
pub struct AuthGate {
    pub keys: KeyStore,
    pub limiter: RateLimiter,
    pub usage: UsageRecorder,
}

impl AuthGate {
    pub fn new(keys: KeyStore, limiter: RateLimiter, usage: UsageRecorder) -> Self {
        Self { keys, limiter, usage }
    }

    pub fn authorize(
        &self,
        raw_credential: &str,
        requested_sport: &str,
    ) -> Result<Admission, AuthError> {
        let record = self.keys.resolve(raw_credential)?;

        if !record.sports.allows(requested_sport) {
            return Err(AuthError::ScopeDenied);
        }

        let now = Utc::now();
        self.limiter
            .check(record.id, record.rate_limit_per_minute, now)?;
        let remaining = self
            .limiter
            .remaining(record.id, record.rate_limit_per_minute, now);

        self.usage.touch(record.id);
        tracing::debug!(
            key_id = record.id,
            key_prefix = %record.key_prefix,
            sport = requested_sport,
            remaining,
            "request admitted"
        );
        Ok(Admission {
            key_id: record.id,
            rate_limit_per_minute: record.rate_limit_per_minute,
            remaining,
        })
    }
}
