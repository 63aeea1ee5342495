//! # Token Revocation Store
//!
//! Tracks revoked JWT identifiers (jti claims) and the set of active
//! tokens per user, so logout and forced logout take effect immediately
//! even while the tokens themselves are still signature-valid.
//!
//! ## Key Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  blacklist:{tokenId}        sentinel, TTL = remaining token lifetime    │
//! │                             (the entry never outlives the token, so     │
//! │                              no manual cleanup is ever needed)          │
//! │                                                                         │
//! │  usertokens:{userId}        set of active token ids for the user        │
//! │  usertokens:{userId}:expiry hash tokenId → RFC3339 expiry, so stale     │
//! │                             members can be pruned or skipped            │
//! │                             (container TTL kept no shorter than the     │
//! │                              longest-lived member)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Invariant: a token found in the blacklist is rejected on every
//! authenticated request before authorization runs, regardless of its
//! own signature validity.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::CoordResult;
use crate::store::KeyValueStore;

const BLACKLIST_PREFIX: &str = "blacklist:";
const USER_TOKENS_PREFIX: &str = "usertokens:";

/// Sentinel stored under blacklist keys; only existence matters.
const REVOKED_SENTINEL: &str = "revoked";

/// Revocation state over the shared store.
#[derive(Clone)]
pub struct TokenRevocationStore {
    store: Arc<dyn KeyValueStore>,
}

impl TokenRevocationStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        TokenRevocationStore { store }
    }

    /// Blacklists one token until its natural expiry.
    ///
    /// A token already past its expiry is a no-op: there is nothing
    /// left to protect, and writing an entry would only leak a key.
    pub async fn revoke(&self, token_id: &str, expires_at: DateTime<Utc>) -> CoordResult<()> {
        let remaining = expires_at - Utc::now();
        let Ok(ttl) = remaining.to_std() else {
            debug!(token_id, "Token already expired; skipping blacklist");
            return Ok(());
        };

        let key = format!("{BLACKLIST_PREFIX}{token_id}");
        self.store.set(&key, REVOKED_SENTINEL, Some(ttl)).await?;
        info!(token_id, ?expires_at, "Token blacklisted");
        Ok(())
    }

    /// Whether `token_id` has been revoked.
    pub async fn is_revoked(&self, token_id: &str) -> CoordResult<bool> {
        let key = format!("{BLACKLIST_PREFIX}{token_id}");
        self.store.exists(&key).await
    }

    /// Records a newly issued token in the user's active set, keeping
    /// its expiry in the parallel hash and refreshing the container TTL
    /// to cover the longest-lived member.
    pub async fn track_user_token(
        &self,
        user_id: &str,
        token_id: &str,
        expires_at: DateTime<Utc>,
    ) -> CoordResult<()> {
        let set_key = format!("{USER_TOKENS_PREFIX}{user_id}");
        let expiry_key = format!("{USER_TOKENS_PREFIX}{user_id}:expiry");

        self.store.set_add(&set_key, token_id).await?;
        self.store
            .hash_set(&expiry_key, token_id, &expires_at.to_rfc3339())
            .await?;

        // Container TTL must outlive the longest-lived member, so take
        // the max across the tracked expiries rather than this token's.
        let latest = self
            .hash_expiries(&expiry_key)
            .await?
            .into_iter()
            .map(|(_, exp)| exp)
            .max()
            .unwrap_or(expires_at);
        if let Ok(ttl) = (latest - Utc::now()).to_std() {
            self.store.expire(&set_key, ttl).await?;
            self.store.expire(&expiry_key, ttl).await?;
        }

        debug!(user_id, token_id, "Tracking issued token");
        Ok(())
    }

    /// Blacklists every live tracked token for `user_id` (forced
    /// logout: password change, admin session revocation). Stale
    /// members are pruned instead of blacklisted. Returns the number of
    /// tokens revoked.
    pub async fn revoke_all_user_tokens(&self, user_id: &str) -> CoordResult<u64> {
        let set_key = format!("{USER_TOKENS_PREFIX}{user_id}");
        let expiry_key = format!("{USER_TOKENS_PREFIX}{user_id}:expiry");

        let now = Utc::now();
        let mut revoked = 0u64;

        for token_id in self.store.set_members(&set_key).await? {
            let expires_at = match self.store.hash_get(&expiry_key, &token_id).await? {
                Some(raw) => match DateTime::parse_from_rfc3339(&raw) {
                    Ok(parsed) => parsed.with_timezone(&Utc),
                    Err(e) => {
                        warn!(user_id, token_id, %e, "Unparseable tracked expiry; pruning");
                        self.prune(&set_key, &expiry_key, &token_id).await?;
                        continue;
                    }
                },
                // No expiry recorded: nothing safe to blacklist against
                None => {
                    self.prune(&set_key, &expiry_key, &token_id).await?;
                    continue;
                }
            };

            if expires_at <= now {
                self.prune(&set_key, &expiry_key, &token_id).await?;
                continue;
            }

            self.revoke(&token_id, expires_at).await?;
            self.prune(&set_key, &expiry_key, &token_id).await?;
            revoked += 1;
        }

        info!(user_id, revoked, "Revoked all user sessions");
        Ok(revoked)
    }

    async fn prune(&self, set_key: &str, expiry_key: &str, token_id: &str) -> CoordResult<()> {
        self.store.set_remove(set_key, token_id).await?;
        self.store.hash_delete(expiry_key, token_id).await?;
        Ok(())
    }

    async fn hash_expiries(&self, expiry_key: &str) -> CoordResult<Vec<(String, DateTime<Utc>)>> {
        let raw = self.store.hash_get_all(expiry_key).await?;
        Ok(raw
            .into_iter()
            .filter_map(|(token_id, exp)| {
                DateTime::parse_from_rfc3339(&exp)
                    .ok()
                    .map(|parsed| (token_id, parsed.with_timezone(&Utc)))
            })
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn revocation() -> (Arc<MemoryStore>, TokenRevocationStore) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), TokenRevocationStore::new(store))
    }

    #[tokio::test]
    async fn test_revocation_is_immediate() {
        let (_, revocation) = revocation();
        let expires = Utc::now() + ChronoDuration::hours(1);

        assert!(!revocation.is_revoked("abc123").await.unwrap());
        revocation.revoke("abc123", expires).await.unwrap();
        assert!(revocation.is_revoked("abc123").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blacklist_entry_expires_with_token() {
        let (_, revocation) = revocation();
        let expires = Utc::now() + ChronoDuration::seconds(30);

        revocation.revoke("abc123", expires).await.unwrap();
        assert!(revocation.is_revoked("abc123").await.unwrap());

        // Past the token's own expiry the entry disappears on its own
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!revocation.is_revoked("abc123").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoking_expired_token_is_noop() {
        let (store, revocation) = revocation();
        let past = Utc::now() - ChronoDuration::minutes(5);

        revocation.revoke("stale", past).await.unwrap();
        assert!(!store.exists("blacklist:stale").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_all_blacklists_live_tokens() {
        let (_, revocation) = revocation();
        let soon = Utc::now() + ChronoDuration::minutes(30);
        let later = Utc::now() + ChronoDuration::hours(2);

        revocation.track_user_token("u-1", "t-a", soon).await.unwrap();
        revocation.track_user_token("u-1", "t-b", later).await.unwrap();

        let revoked = revocation.revoke_all_user_tokens("u-1").await.unwrap();
        assert_eq!(revoked, 2);
        assert!(revocation.is_revoked("t-a").await.unwrap());
        assert!(revocation.is_revoked("t-b").await.unwrap());

        // Second pass finds nothing left to revoke
        assert_eq!(revocation.revoke_all_user_tokens("u-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_revoke_all_prunes_stale_members() {
        let (_, revocation) = revocation();
        let expired = Utc::now() - ChronoDuration::minutes(1);
        let live = Utc::now() + ChronoDuration::hours(1);

        revocation.track_user_token("u-2", "dead", expired).await.unwrap();
        revocation.track_user_token("u-2", "alive", live).await.unwrap();

        let revoked = revocation.revoke_all_user_tokens("u-2").await.unwrap();
        assert_eq!(revoked, 1);
        assert!(!revocation.is_revoked("dead").await.unwrap());
        assert!(revocation.is_revoked("alive").await.unwrap());
    }

    #[tokio::test]
    async fn test_tokens_do_not_cross_users() {
        let (_, revocation) = revocation();
        let expires = Utc::now() + ChronoDuration::hours(1);

        revocation.track_user_token("u-1", "mine", expires).await.unwrap();
        revocation.track_user_token("u-2", "theirs", expires).await.unwrap();

        revocation.revoke_all_user_tokens("u-1").await.unwrap();
        assert!(revocation.is_revoked("mine").await.unwrap());
        assert!(!revocation.is_revoked("theirs").await.unwrap());
    }
}
