use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::runner::SharedSession;
use crate::session::QuizSession;

pub const DEFAULT_MAX_SESSIONS: usize = 10_000;
pub const DEFAULT_IDLE_TTL_MINUTES: i64 = 60;

struct StoredSession {
    session: SharedSession,
    last_accessed: DateTime<Utc>,
    access_seq: u64,
}

#[derive(Default)]
struct Slots {
    entries: HashMap<Uuid, StoredSession>,
    next_seq: u64,
}

impl Slots {
    fn touch(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Live quiz sessions keyed by id, expired after a period of inactivity.
#[derive(Clone)]
pub struct SessionStore {
    slots: Arc<RwLock<Slots>>,
    max_sessions: usize,
    idle_ttl_minutes: i64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS, DEFAULT_IDLE_TTL_MINUTES)
    }
}

impl SessionStore {
    pub fn new(max_sessions: usize, idle_ttl_minutes: i64) -> Self {
        Self {
            slots: Arc::new(RwLock::new(Slots::default())),
            max_sessions: max_sessions.max(1),
            idle_ttl_minutes,
        }
    }

    /// Stores a new session, evicting expired ones and, at capacity, the least recently used.
    pub async fn insert(&self, session: QuizSession) -> (Uuid, SharedSession) {
        let id = Uuid::new_v4();
        let shared: SharedSession = Arc::new(Mutex::new(session));
        let now = Utc::now();

        let mut slots = self.slots.write().await;
        self.cleanup_expired_entries(&mut slots, now);
        if slots.entries.len() >= self.max_sessions {
            Self::evict_least_recent(&mut slots);
        }

        let access_seq = slots.touch();
        slots.entries.insert(
            id,
            StoredSession {
                session: shared.clone(),
                last_accessed: now,
                access_seq,
            },
        );
        debug!(session_id = %id, live_sessions = slots.entries.len(), "Session stored");
        (id, shared)
    }

    /// Looks up a live session and marks it as used. Expired sessions are removed.
    pub async fn get(&self, id: Uuid) -> Option<SharedSession> {
        let mut slots = self.slots.write().await;
        let now = Utc::now();

        let expired = match slots.entries.get(&id) {
            Some(stored) => self.is_expired(stored, now),
            None => return None,
        };
        if expired {
            slots.entries.remove(&id);
            debug!(session_id = %id, "Session expired, removing");
            return None;
        }

        let access_seq = slots.touch();
        let stored = slots.entries.get_mut(&id)?;
        stored.last_accessed = now;
        stored.access_seq = access_seq;
        Some(stored.session.clone())
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.slots.write().await.entries.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Removes every expired session. Returns how many were dropped.
    pub async fn cleanup(&self) -> usize {
        let mut slots = self.slots.write().await;
        let removed = self.cleanup_expired_entries(&mut slots, Utc::now());
        if removed > 0 {
            info!(removed, live_sessions = slots.entries.len(), "Expired sessions removed");
        }
        removed
    }

    fn is_expired(&self, stored: &StoredSession, now: DateTime<Utc>) -> bool {
        stored.last_accessed + Duration::minutes(self.idle_ttl_minutes) <= now
    }

    fn cleanup_expired_entries(&self, slots: &mut Slots, now: DateTime<Utc>) -> usize {
        let expired_keys: Vec<Uuid> = slots
            .entries
            .iter()
            .filter(|(_, stored)| self.is_expired(stored, now))
            .map(|(key, _)| *key)
            .collect();

        for key in &expired_keys {
            slots.entries.remove(key);
            debug!(session_id = %key, "Removed expired session");
        }
        expired_keys.len()
    }

    fn evict_least_recent(slots: &mut Slots) {
        if let Some(oldest_key) = slots
            .entries
            .iter()
            .min_by_key(|(_, stored)| stored.access_seq)
            .map(|(key, _)| *key)
        {
            slots.entries.remove(&oldest_key);
            debug!(session_id = %oldest_key, "Evicted least recently used session");
        }
    }
}
