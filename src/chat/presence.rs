//! Presence tracker shared by every open view.
//!
//! Only realtime online/offline events mutate it. There is no reconciliation
//! with the server: a dropped event leaves the entry stale until the next one.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Cloneable handle to the process-wide set of online user ids.
#[derive(Clone, Default)]
pub struct PresenceTracker {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user as online. Idempotent.
    pub fn mark_online(&self, user_id: &str) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(user_id.to_string());
    }

    /// Record a user as offline. Idempotent.
    pub fn mark_offline(&self, user_id: &str) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.remove(user_id);
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.contains(user_id)
    }

    pub fn online_count(&self) -> usize {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.len()
    }

    /// Sorted copy of the online ids.
    pub fn snapshot(&self) -> Vec<String> {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = guard.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// "Active now" / "Offline" label used in conversation headers.
    pub fn label(&self, user_id: &str) -> &'static str {
        if self.is_online(user_id) {
            "Active now"
        } else {
            "Offline"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_offline_idempotent() {
        let presence = PresenceTracker::new();
        presence.mark_online("u1");
        presence.mark_online("u1");
        assert!(presence.is_online("u1"));
        assert_eq!(presence.online_count(), 1);

        presence.mark_offline("u1");
        presence.mark_offline("u1");
        assert!(!presence.is_online("u1"));
        assert_eq!(presence.online_count(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let presence = PresenceTracker::new();
        let sidebar_view = presence.clone();

        presence.mark_online("u2");
        presence.mark_online("u1");

        assert!(sidebar_view.is_online("u2"));
        assert_eq!(sidebar_view.snapshot(), vec!["u1", "u2"]);
        assert_eq!(sidebar_view.online_count(), 2);
        assert_eq!(sidebar_view.label("u3"), "Offline");
        assert_eq!(sidebar_view.label("u1"), "Active now");
    }
}
