//! Fixed-window rate limiting (spec §7 "RateLimited"): one window counter
//! per client identity (bearer token or remote address), reset on rollover.

use crate::auth::Identity;
use crate::error::Error;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;
use gatewayd_config::RateLimitConfig;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

struct Window {
    started_at: AtomicU64,
    count: AtomicU32,
}

pub struct RateLimiter {
    windows: DashMap<String, Window>,
    config: RateLimitConfig,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    /// Returns `Ok(())` if the caller identified by `key` is within budget,
    /// or `Err(retry_after_secs)` once the window's quota is exhausted.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        if !self.config.enabled {
            return Ok(());
        }

        let current = now();
        let entry = self.windows.entry(key.to_string()).or_insert_with(|| Window {
            started_at: AtomicU64::new(current),
            count: AtomicU32::new(0),
        });

        let started_at = entry.started_at.load(Ordering::SeqCst);
        if current.saturating_sub(started_at) >= self.config.window_secs {
            entry.started_at.store(current, Ordering::SeqCst);
            entry.count.store(0, Ordering::SeqCst);
        }

        let count = entry.count.fetch_add(1, Ordering::SeqCst) + 1;
        if count > self.config.max_requests {
            let retry_after = self
                .config
                .window_secs
                .saturating_sub(current.saturating_sub(entry.started_at.load(Ordering::SeqCst)));
            Err(retry_after.max(1))
        } else {
            Ok(())
        }
    }
}

/// Runs after `require_bearer` so the identity it attached is the rate-limit
/// key; applies to every authenticated route (spec §7 "RateLimited").
pub async fn enforce_rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Result<Response, Error> {
    let key = req
        .extensions()
        .get::<Identity>()
        .map(|i| i.client_id.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    limiter
        .check(&key)
        .map_err(|retry_after_secs| Error::RateLimited { retry_after_secs })?;

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: u32, window: u64) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            window_secs: window,
            max_requests: max,
        }
    }

    #[test]
    fn allows_up_to_the_configured_maximum() {
        let limiter = RateLimiter::new(config(3, 60));
        assert!(limiter.check("client").is_ok());
        assert!(limiter.check("client").is_ok());
        assert!(limiter.check("client").is_ok());
        assert!(limiter.check("client").is_err());
    }

    #[test]
    fn disabled_limiter_never_rejects() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: false,
            window_secs: 60,
            max_requests: 1,
        });
        for _ in 0..10 {
            assert!(limiter.check("client").is_ok());
        }
    }

    #[test]
    fn separate_clients_have_independent_budgets() {
        let limiter = RateLimiter::new(config(1, 60));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_ok());
        assert!(limiter.check("a").is_err());
    }
}
