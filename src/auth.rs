//! Explicit session state for the dashboard API.
//!
//! Replaces the ambient auth provider the screens used to share: the session
//! is constructed once, handed to the API client and polling loader, and
//! refreshed explicitly. A missing token is tolerated: requests simply go
//! out unauthenticated, which the dev/mock backend accepts.

use std::sync::{Arc, Mutex};
use tracing::info;

use crate::error::StorageError;
use crate::storage::OverlayCache;

const AUTH_CATEGORY: &str = "auth";
const TOKEN_KEY: &str = "token";

/// Bearer-token session backed by the overlay cache.
pub struct Session {
    cache: Arc<OverlayCache>,
    token: Mutex<Option<String>>,
}

impl Session {
    /// Build a session from whatever token the cache currently holds.
    pub fn load(cache: Arc<OverlayCache>) -> Self {
        let token = cache.setting_get(AUTH_CATEGORY, TOKEN_KEY);
        if token.is_some() {
            info!("session restored from cache");
        }
        Self {
            cache,
            token: Mutex::new(token),
        }
    }

    /// Store a token and start using it on subsequent requests.
    pub fn login(&self, token: &str) -> Result<(), StorageError> {
        self.cache.setting_set(AUTH_CATEGORY, TOKEN_KEY, token)?;
        *self.lock() = Some(token.to_string());
        Ok(())
    }

    /// Drop the token here and in the cache.
    pub fn logout(&self) -> Result<(), StorageError> {
        self.cache.setting_delete(AUTH_CATEGORY, TOKEN_KEY)?;
        *self.lock() = None;
        info!("session cleared");
        Ok(())
    }

    /// Re-read the persisted token, picking up a login performed elsewhere
    /// (another window, a previous run). Returns whether a token is present.
    pub fn refresh_session(&self) -> bool {
        let token = self.cache.setting_get(AUTH_CATEGORY, TOKEN_KEY);
        let present = token.is_some();
        *self.lock() = token;
        present
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().is_some()
    }

    /// Value for the `Authorization` header, when a token exists.
    pub fn bearer(&self) -> Option<String> {
        self.lock().as_ref().map(|t| format!("Bearer {t}"))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::load(Arc::new(OverlayCache::open_in_memory().unwrap()))
    }

    #[test]
    fn test_unauthenticated_by_default() {
        let session = session();
        assert!(!session.is_authenticated());
        assert_eq!(session.bearer(), None);
    }

    #[test]
    fn test_login_logout_round_trip() {
        let session = session();

        session.login("tok-abc").unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.bearer().as_deref(), Some("Bearer tok-abc"));

        session.logout().unwrap();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_refresh_picks_up_cache_writes() {
        let cache = Arc::new(OverlayCache::open_in_memory().unwrap());
        let session = Session::load(cache.clone());
        assert!(!session.is_authenticated());

        // Token written behind the session's back.
        cache.setting_set("auth", "token", "tok-late").unwrap();
        assert!(!session.is_authenticated());

        assert!(session.refresh_session());
        assert_eq!(session.bearer().as_deref(), Some("Bearer tok-late"));
    }

    #[test]
    fn test_session_survives_reload() {
        let cache = Arc::new(OverlayCache::open_in_memory().unwrap());
        Session::load(cache.clone()).login("tok-persist").unwrap();

        let reloaded = Session::load(cache);
        assert!(reloaded.is_authenticated());
    }
}
