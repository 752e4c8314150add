//! Token and refresh-token stores with TTL cleanup (spec §4.6 "Tokens").

use dashmap::DashMap;
use rand::RngCore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(3600);
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub expires_at: u64,
    pub subject: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub token: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub subject: Option<String>,
    pub expires_at: u64,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn random_token_hex() -> String {
    // 32-byte random hex string (spec §4.6).
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Single mutex-equivalent (DashMap shards internally) per store; tokens are
/// short critical sections so contention is trivial (spec §5 "Shared
/// resource policy").
pub struct TokenStore {
    access: DashMap<String, AccessToken>,
    refresh: DashMap<String, RefreshToken>,
    access_ttl: AtomicU64,
    refresh_ttl: AtomicU64,
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            access: DashMap::new(),
            refresh: DashMap::new(),
            access_ttl: AtomicU64::new(ACCESS_TOKEN_TTL.as_secs()),
            refresh_ttl: AtomicU64::new(REFRESH_TOKEN_TTL.as_secs()),
        }
    }

    pub fn with_ttls(access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let store = Self::new();
        store.access_ttl.store(access_ttl.as_secs(), Ordering::SeqCst);
        store.refresh_ttl.store(refresh_ttl.as_secs(), Ordering::SeqCst);
        store
    }

    /// Issues an access token, optionally paired with a refresh token
    /// (spec §4.6 grant table: `password` issues both, `client_credentials` access-only).
    pub fn issue(
        &self,
        client_id: &str,
        scopes: Vec<String>,
        subject: Option<String>,
        with_refresh: bool,
    ) -> AccessToken {
        let refresh_token = if with_refresh {
            Some(self.issue_refresh(client_id, scopes.clone(), subject.clone()))
        } else {
            None
        };

        let access = AccessToken {
            token: random_token_hex(),
            client_id: client_id.to_string(),
            scopes,
            expires_at: now() + self.access_ttl.load(Ordering::SeqCst),
            subject,
            refresh_token: refresh_token.as_ref().map(|r| r.token.clone()),
        };
        self.access.insert(access.token.clone(), access.clone());
        access
    }

    fn issue_refresh(
        &self,
        client_id: &str,
        scopes: Vec<String>,
        subject: Option<String>,
    ) -> RefreshToken {
        let refresh = RefreshToken {
            token: random_token_hex(),
            client_id: client_id.to_string(),
            scopes,
            subject,
            expires_at: now() + self.refresh_ttl.load(Ordering::SeqCst),
        };
        self.refresh.insert(refresh.token.clone(), refresh.clone());
        refresh
    }

    /// A token validates iff present and unexpired (spec §8 "For all tokens issued").
    pub fn validate(&self, token: &str) -> Option<AccessToken> {
        let entry = self.access.get(token)?;
        if entry.expires_at > now() {
            Some(entry.clone())
        } else {
            None
        }
    }

    pub fn introspect(&self, token: &str) -> Option<AccessToken> {
        self.validate(token)
    }

    /// Rotation: the presented refresh token is invalidated atomically with
    /// issuance of the replacement (spec §8 "For all refresh-token grants").
    pub fn rotate_refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> Option<(AccessToken, RefreshToken)> {
        // Validate ownership and expiry on a non-removing lookup first: a
        // wrong-client replay must not destroy some other client's still-valid
        // refresh token just because the grant is rejected (spec §8 "For all
        // refresh-token grants: the presented refresh token is invalidated
        // atomically with the issuance of the replacement" — invalidation
        // only happens once a replacement is actually issued).
        {
            let entry = self.refresh.get(refresh_token)?;
            if entry.client_id != client_id || entry.expires_at <= now() {
                return None;
            }
        }
        let (_, old) = self.refresh.remove(refresh_token)?;

        let new_refresh = self.issue_refresh(client_id, old.scopes.clone(), old.subject.clone());
        let access = AccessToken {
            token: random_token_hex(),
            client_id: client_id.to_string(),
            scopes: old.scopes,
            expires_at: now() + self.access_ttl.load(Ordering::SeqCst),
            subject: old.subject,
            refresh_token: Some(new_refresh.token.clone()),
        };
        self.access.insert(access.token.clone(), access.clone());
        Some((access, new_refresh))
    }

    /// Removes the access token and its paired refresh token if any.
    /// Idempotent: revoking an unknown token is not an error (spec §4.6).
    pub fn revoke(&self, token: &str) {
        if let Some((_, access)) = self.access.remove(token) {
            if let Some(refresh) = access.refresh_token {
                self.refresh.remove(&refresh);
            }
            return;
        }
        // A caller may also present a refresh token to `/oauth/revoke`.
        self.refresh.remove(token);
    }

    /// Sweeps expired entries from both stores, run every 60s (spec §4.6).
    pub fn sweep(&self) {
        let cutoff = now();
        self.access.retain(|_, v| v.expires_at > cutoff);
        self.refresh.retain(|_, v| v.expires_at > cutoff);
    }

    pub fn revoke_all_for_client(&self, client_id: &str) {
        self.access.retain(|_, v| v.client_id != client_id);
        self.refresh.retain(|_, v| v.client_id != client_id);
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates_until_expiry() {
        let store = TokenStore::with_ttls(Duration::from_secs(1), Duration::from_secs(60));
        let access = store.issue("c1", vec!["tools".to_string()], None, false);
        assert!(store.validate(&access.token).is_some());
    }

    #[test]
    fn expired_token_fails_validation() {
        let store = TokenStore::with_ttls(Duration::from_secs(0), Duration::from_secs(60));
        let access = store.issue("c1", vec![], None, false);
        std::thread::sleep(Duration::from_millis(1100));
        assert!(store.validate(&access.token).is_none());
    }

    #[test]
    fn revoked_token_never_validates_again() {
        let store = TokenStore::new();
        let access = store.issue("c1", vec![], None, false);
        store.revoke(&access.token);
        assert!(store.validate(&access.token).is_none());
        // Idempotent.
        store.revoke(&access.token);
    }

    #[test]
    fn rotation_invalidates_presented_refresh_token() {
        let store = TokenStore::new();
        let access = store.issue("c1", vec![], Some("alice".to_string()), true);
        let refresh = access.refresh_token.unwrap();

        let (_access2, refresh2) = store.rotate_refresh(&refresh, "c1").expect("rotates");
        assert!(store.rotate_refresh(&refresh, "c1").is_none());
        assert_ne!(refresh, refresh2.token);
    }

    #[test]
    fn wrong_client_rotation_leaves_refresh_token_usable_by_its_owner() {
        let store = TokenStore::new();
        let access = store.issue("c1", vec![], Some("alice".to_string()), true);
        let refresh = access.refresh_token.unwrap();

        assert!(store.rotate_refresh(&refresh, "c2").is_none());
        assert!(store.rotate_refresh(&refresh, "c1").is_some());
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let store = TokenStore::with_ttls(Duration::from_secs(0), Duration::from_secs(0));
        store.issue("c1", vec![], None, true);
        std::thread::sleep(Duration::from_millis(1100));
        store.sweep();
        assert_eq!(store.access.len(), 0);
        assert_eq!(store.refresh.len(), 0);
    }
}
