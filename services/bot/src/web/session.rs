//! services/bot/src/web/session.rs
//!
//! In-process session bookkeeping for authenticated users and users who are
//! mid-login. Sessions live only in memory: a restart forces re-login even if
//! the durable authenticated flag is still set.

use shelfbot_core::domain::UserId;
use shelfbot_core::ports::Clock;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One authenticated user's in-memory session.
#[derive(Debug, Clone)]
struct UserSession {
    last_activity: Instant,
    has_seen_instructions: bool,
}

/// Owns the session map and the pending-login set. Constructed once at
/// startup and carried in the shared application state; expiry is checked
/// lazily on access, there is no background sweep. Concurrent messages from
/// the same user are rare and last-writer-wins on `last_activity` is fine.
pub struct SessionManager {
    sessions: Mutex<HashMap<UserId, UserSession>>,
    pending_logins: Mutex<HashSet<UserId>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            pending_logins: Mutex::new(HashSet::new()),
            ttl,
            clock,
        }
    }

    // --- Pending logins ---

    /// Marks the user as waiting for a password.
    pub fn begin_login(&self, user_id: UserId) {
        self.pending_logins.lock().unwrap().insert(user_id);
    }

    /// Removes the user from the pending set. Returns whether they were in it.
    pub fn cancel_login(&self, user_id: UserId) -> bool {
        self.pending_logins.lock().unwrap().remove(&user_id)
    }

    pub fn is_pending_login(&self, user_id: UserId) -> bool {
        self.pending_logins.lock().unwrap().contains(&user_id)
    }

    // --- Sessions ---

    /// Creates a fresh session after a successful password match.
    pub fn start_session(&self, user_id: UserId) {
        self.sessions.lock().unwrap().insert(
            user_id,
            UserSession {
                last_activity: self.clock.now(),
                has_seen_instructions: false,
            },
        );
    }

    /// Whether the user has a non-expired session. An expired entry is
    /// removed on the way out (lazy expiry).
    pub fn is_live(&self, user_id: UserId) -> bool {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get(&user_id) {
            Some(session) if now.saturating_duration_since(session.last_activity) <= self.ttl => {
                true
            }
            Some(_) => {
                sessions.remove(&user_id);
                false
            }
            None => false,
        }
    }

    /// Refreshes `last_activity` after a privileged action.
    pub fn touch(&self, user_id: UserId) {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(&user_id) {
            session.last_activity = self.clock.now();
        }
    }

    /// Drops the session outright (expiry path).
    pub fn remove(&self, user_id: UserId) {
        self.sessions.lock().unwrap().remove(&user_id);
    }

    /// Returns true exactly once per session: the first caller sees `true`
    /// (and flips the flag), later callers see `false`. Gates the verbose
    /// upload instructions.
    pub fn take_first_instructions(&self, user_id: UserId) -> bool {
        match self.sessions.lock().unwrap().get_mut(&user_id) {
            Some(session) if !session.has_seen_instructions => {
                session.has_seen_instructions = true;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SessionManager;
    use crate::web::testing::ManualClock;
    use std::sync::Arc;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(600);

    fn manager() -> (SessionManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (SessionManager::new(TTL, clock.clone()), clock)
    }

    #[test]
    fn fresh_session_is_live_and_expires_after_the_window() {
        let (manager, clock) = manager();
        manager.start_session(7);
        assert!(manager.is_live(7));

        clock.advance(TTL + Duration::from_secs(1));
        assert!(!manager.is_live(7));
        // The expired entry was dropped lazily, so it stays dead.
        assert!(!manager.is_live(7));
    }

    #[test]
    fn touch_extends_the_session() {
        let (manager, clock) = manager();
        manager.start_session(7);

        clock.advance(Duration::from_secs(500));
        manager.touch(7);
        clock.advance(Duration::from_secs(500));
        assert!(manager.is_live(7));

        clock.advance(TTL + Duration::from_secs(1));
        assert!(!manager.is_live(7));
    }

    #[test]
    fn pending_login_set_add_remove() {
        let (manager, _clock) = manager();
        assert!(!manager.is_pending_login(1));
        manager.begin_login(1);
        assert!(manager.is_pending_login(1));
        assert!(manager.cancel_login(1));
        assert!(!manager.is_pending_login(1));
        assert!(!manager.cancel_login(1));
    }

    #[test]
    fn verbose_instructions_are_offered_exactly_once_per_session() {
        let (manager, _clock) = manager();
        manager.start_session(7);
        assert!(manager.take_first_instructions(7));
        assert!(!manager.take_first_instructions(7));

        // A new session resets the flag.
        manager.start_session(7);
        assert!(manager.take_first_instructions(7));
    }

    #[test]
    fn no_session_means_not_live_and_no_instructions() {
        let (manager, _clock) = manager();
        assert!(!manager.is_live(42));
        assert!(!manager.take_first_instructions(42));
    }
}
