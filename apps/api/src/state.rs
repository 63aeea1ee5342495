//! Shared application state.

use std::sync::Arc;

use meridian_core::RateLimitPolicy;
use meridian_coord::{
    AuditQueue, KeyValueStore, LockManager, RateLimiter, TokenRevocationStore,
};

use crate::auth::JwtManager;
use crate::config::ApiConfig;

/// State handed to every handler and interceptor. Cheap to clone; all
/// components share the same backing store connection.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyValueStore>,
    pub locks: LockManager,
    pub rate_limiter: RateLimiter,
    pub revocation: TokenRevocationStore,
    pub audit: AuditQueue,
    pub policy: Arc<RateLimitPolicy>,
    pub jwt: Arc<JwtManager>,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    /// Wire every component against one backing store.
    pub fn new(store: Arc<dyn KeyValueStore>, config: ApiConfig) -> Self {
        let policy = Arc::new(config.coord.rate_limit_policy());
        let jwt = Arc::new(JwtManager::new(
            config.jwt_secret.clone(),
            config.jwt_access_lifetime_secs,
        ));

        AppState {
            locks: LockManager::new(store.clone()),
            rate_limiter: RateLimiter::new(store.clone()),
            revocation: TokenRevocationStore::new(store.clone()),
            audit: AuditQueue::new(store.clone()),
            store,
            policy,
            jwt,
            config: Arc::new(config),
        }
    }
}
