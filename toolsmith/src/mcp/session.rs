//! MCP sessions opened by `initialize`.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Session {
    opened_at: Instant,
    last_seen: Instant,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session and return its id.
    pub fn open(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Instant::now();
        self.sessions.insert(
            id.clone(),
            Session {
                opened_at: now,
                last_seen: now,
            },
        );
        id
    }

    /// Mark a session as active. False when the session is unknown.
    pub fn touch(&self, id: &str) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut session) => {
                session.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn close(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn age(&self, id: &str) -> Option<Duration> {
        self.sessions.get(id).map(|s| s.opened_at.elapsed())
    }

    /// Drop sessions idle for longer than `ttl`; returns how many were dropped.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.last_seen.elapsed() <= ttl);
        before.saturating_sub(self.sessions.len())
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_touch_close() {
        let store = SessionStore::new();
        let id = store.open();
        assert!(store.touch(&id));
        assert!(store.age(&id).is_some());
        assert!(store.close(&id));
        assert!(!store.touch(&id));
    }

    #[test]
    fn test_evict_idle() {
        let store = SessionStore::new();
        store.open();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.evict_idle(Duration::from_secs(60)), 0);
        assert_eq!(store.evict_idle(Duration::ZERO), 1);
        assert!(store.is_empty());
    }
}
