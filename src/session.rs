//! Per-user pending question storage.
//!
//! State here is volatile and process-lifetime only. Each user has at most
//! one pending question at a time; a new photo overwrites any unresolved
//! prior question (last image wins).

use std::collections::HashMap;
use std::sync::Mutex;

/// Stable per-user/chat key for session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mapping from user to pending extracted question text.
///
/// This is the only mutable shared state in the process. The lock is held
/// just for an instant per operation, so a plain [`Mutex`] is fine even
/// from async code.
#[derive(Debug, Default)]
pub struct SessionStore {
    pending: Mutex<HashMap<UserId, String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a pending question, overwriting any existing one for this user.
    pub fn put(&self, user: UserId, text: String) {
        let mut pending = self.pending.lock().expect("lock poisoned");
        pending.insert(user, text);
    }

    /// Atomically retrieve and remove the pending question for this user.
    ///
    /// Consume-once: a second `take` after a single `put` returns `None`,
    /// even under concurrent selection events for the same user.
    pub fn take(&self, user: UserId) -> Option<String> {
        let mut pending = self.pending.lock().expect("lock poisoned");
        pending.remove(&user)
    }

    /// Remove the pending question without retrieving it.
    pub fn clear(&self, user: UserId) {
        let mut pending = self.pending.lock().expect("lock poisoned");
        pending.remove(&user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_is_consume_once() {
        let store = SessionStore::new();
        store.put(UserId(1), "What is 2+2?".to_owned());
        assert_eq!(store.take(UserId(1)).as_deref(), Some("What is 2+2?"));
        assert_eq!(store.take(UserId(1)), None);
    }

    #[test]
    fn put_overwrites_existing_question() {
        let store = SessionStore::new();
        store.put(UserId(1), "first".to_owned());
        store.put(UserId(1), "second".to_owned());
        assert_eq!(store.take(UserId(1)).as_deref(), Some("second"));
        assert_eq!(store.take(UserId(1)), None);
    }

    #[test]
    fn users_are_independent() {
        let store = SessionStore::new();
        store.put(UserId(1), "one".to_owned());
        store.put(UserId(2), "two".to_owned());
        assert_eq!(store.take(UserId(2)).as_deref(), Some("two"));
        assert_eq!(store.take(UserId(1)).as_deref(), Some("one"));
    }

    #[test]
    fn clear_discards_without_retrieval() {
        let store = SessionStore::new();
        store.put(UserId(1), "abandoned".to_owned());
        store.clear(UserId(1));
        assert_eq!(store.take(UserId(1)), None);
        // Clearing an absent entry is a no-op.
        store.clear(UserId(1));
    }
}
