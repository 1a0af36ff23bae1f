//! Process-wide registry mapping session ids to their component bundle.
//! Entries idle past the TTL are pruned on every access, so the map
//! cannot grow without bound across long-lived hosts.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

struct SessionEntry<T> {
    bundle: T,
    last_seen: DateTime<Utc>,
}

pub struct SessionRegistry<T> {
    sessions: Mutex<HashMap<String, SessionEntry<T>>>,
    ttl: Duration,
}

impl<T: Clone> SessionRegistry<T> {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Returns the live bundle for the session, building one only when no
    /// unexpired entry exists. Touches the entry's last-seen stamp.
    pub async fn get_or_create<E>(
        &self,
        session_id: &str,
        build: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, entry| now - entry.last_seen <= self.ttl);

        if let Some(entry) = sessions.get_mut(session_id) {
            entry.last_seen = now;
            return Ok(entry.bundle.clone());
        }

        let bundle = build()?;
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                bundle: bundle.clone(),
                last_seen: now,
            },
        );
        Ok(bundle)
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.lock().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    #[cfg(test)]
    async fn backdate(&self, session_id: &str, minutes: i64) {
        if let Some(entry) = self.sessions.lock().await.get_mut(session_id) {
            entry.last_seen = Utc::now() - Duration::minutes(minutes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reuses_live_sessions() {
        let registry: SessionRegistry<u32> = SessionRegistry::new(30);
        let first: Result<u32, ()> = registry.get_or_create("s1", || Ok(1)).await;
        assert_eq!(first.unwrap(), 1);

        // The builder must not run again for a live session.
        let second: Result<u32, ()> = registry
            .get_or_create("s1", || panic!("rebuilt a live session"))
            .await;
        assert_eq!(second.unwrap(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn evicts_idle_sessions_past_the_ttl() {
        let registry: SessionRegistry<u32> = SessionRegistry::new(30);
        let _: Result<u32, ()> = registry.get_or_create("stale", || Ok(1)).await;
        let _: Result<u32, ()> = registry.get_or_create("fresh", || Ok(2)).await;
        registry.backdate("stale", 31).await;

        let rebuilt: Result<u32, ()> = registry.get_or_create("stale", || Ok(3)).await;
        assert_eq!(rebuilt.unwrap(), 3);
        let fresh: Result<u32, ()> = registry
            .get_or_create("fresh", || panic!("fresh session was evicted"))
            .await;
        assert_eq!(fresh.unwrap(), 2);
    }

    #[tokio::test]
    async fn build_failures_do_not_register_a_session() {
        let registry: SessionRegistry<u32> = SessionRegistry::new(30);
        let failed: Result<u32, &str> = registry.get_or_create("s1", || Err("boom")).await;
        assert!(failed.is_err());
        assert_eq!(registry.len().await, 0);

        let created: Result<u32, ()> = registry.get_or_create("s1", || Ok(7)).await;
        assert!(created.is_ok());
        assert!(registry.remove("s1").await);
        assert_eq!(registry.len().await, 0);
    }
}
