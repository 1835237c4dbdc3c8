//! Session identity and the process-wide session cache. Per the
//! concurrency model (§5), the session cache is the only mutable
//! process-wide structure; it is guarded by `parking_lot::RwLock`,
//! following the teacher's own choice of `parking_lot` for in-process
//! shared state.

use crate::ids::{SessionId, UserId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::SystemTime;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SessionMode {
    ReadOnly,
    ReadWrite,
}

/// The raw `user-id:random-secret` cookie value, used as the session
/// cache key.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CookieSecret(pub String);

#[derive(Clone, Debug)]
pub struct Session {
    pub id: SessionId,
    pub user_id: Option<UserId>,
    pub created_at: SystemTime,
    pub mode: SessionMode,
}

impl Session {
    /// Anonymous sessions are always read-only; `public_read` only
    /// controls whether the server hands one out at all (`spec.md` §5's
    /// public-read-anonymous config flag), not its permission level.
    pub fn anonymous(id: SessionId, public_read: bool) -> Session {
        let _ = public_read;
        Session {
            id,
            user_id: None,
            created_at: SystemTime::now(),
            mode: SessionMode::ReadOnly,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }

    pub fn cookie(&self, secret: &str) -> String {
        match self.user_id {
            Some(uid) => format!("{}:{}", uid.get(), secret),
            None => format!("0:{secret}"),
        }
    }
}

pub struct SessionCache {
    by_cookie: RwLock<HashMap<CookieSecret, Session>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl SessionCache {
    pub fn new() -> Self {
        SessionCache {
            by_cookie: RwLock::new(HashMap::new()),
            next_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    pub fn alloc_id(&self) -> SessionId {
        SessionId(self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
    }

    pub fn insert(&self, cookie: CookieSecret, session: Session) {
        self.by_cookie.write().insert(cookie, session);
    }

    pub fn lookup(&self, cookie: &CookieSecret) -> Option<Session> {
        self.by_cookie.read().get(cookie).cloned()
    }

    pub fn remove(&self, cookie: &CookieSecret) {
        self.by_cookie.write().remove(cookie);
    }

    pub fn len(&self) -> usize {
        self.by_cookie.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_session_is_read_only() {
        let cache = SessionCache::new();
        let s = Session::anonymous(cache.alloc_id(), true);
        assert_eq!(s.mode, SessionMode::ReadOnly);
        assert!(s.is_anonymous());
    }

    #[test]
    fn cache_insert_lookup_remove_roundtrip() {
        let cache = SessionCache::new();
        let s = Session::anonymous(cache.alloc_id(), false);
        let cookie = CookieSecret("abc".into());
        cache.insert(cookie.clone(), s.clone());
        assert!(cache.lookup(&cookie).is_some());
        cache.remove(&cookie);
        assert!(cache.lookup(&cookie).is_none());
    }

    #[test]
    fn cookie_format_matches_spec() {
        let cache = SessionCache::new();
        let mut s = Session::anonymous(cache.alloc_id(), false);
        s.user_id = Some(UserId(42));
        assert_eq!(s.cookie("secret123"), "42:secret123");
    }
}
