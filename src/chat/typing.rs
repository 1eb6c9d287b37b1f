//! Typing coordinator
//!
//! Two halves:
//!   - `TypingIndicators`: remote users composing, per conversation.
//!   - `TypingDebounce`: when the local user's "typing" / "stop typing"
//!     signals go out.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

/// A remote user currently composing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEntry {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_name_ar: Option<String>,
}

/// Outbound typing signal for the open conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// Remote typing state, keyed by conversation id.
///
/// Entries leave on an explicit stop event. With `max_age` set they are also
/// retired by `expire` once they have been silent that long.
#[derive(Debug, Default)]
pub struct TypingIndicators {
    by_conversation: HashMap<String, Vec<(TypingEntry, Instant)>>,
    max_age: Option<Duration>,
}

impl TypingIndicators {
    pub fn new(max_age: Option<Duration>) -> Self {
        Self {
            by_conversation: HashMap::new(),
            max_age,
        }
    }

    /// Record a typing-start event. A user appears at most once per conversation;
    /// a repeated start only refreshes the entry's timestamp.
    pub fn start(&mut self, conversation_id: &str, entry: TypingEntry, now: Instant) -> bool {
        let entries = self
            .by_conversation
            .entry(conversation_id.to_string())
            .or_default();
        match entries.iter_mut().find(|(e, _)| e.user_id == entry.user_id) {
            Some(existing) => {
                existing.1 = now;
                false
            }
            None => {
                entries.push((entry, now));
                true
            }
        }
    }

    /// Record a typing-stop event.
    pub fn stop(&mut self, conversation_id: &str, user_id: &str) -> bool {
        let Some(entries) = self.by_conversation.get_mut(conversation_id) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(e, _)| e.user_id != user_id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.by_conversation.remove(conversation_id);
        }
        removed
    }

    /// Users composing in a conversation, in the order they started.
    pub fn active(&self, conversation_id: &str) -> Vec<&TypingEntry> {
        self.by_conversation
            .get(conversation_id)
            .map(|entries| entries.iter().map(|(e, _)| e).collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self, conversation_id: &str) {
        self.by_conversation.remove(conversation_id);
    }

    /// Retire entries silent for longer than `max_age`. Returns how many left.
    pub fn expire(&mut self, now: Instant) -> usize {
        let Some(max_age) = self.max_age else {
            return 0;
        };
        let mut removed = 0;
        self.by_conversation.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(_, since)| now.saturating_duration_since(*since) < max_age);
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }

    /// Earliest instant at which `expire` would retire something.
    pub fn next_expiry(&self) -> Option<Instant> {
        let max_age = self.max_age?;
        self.by_conversation
            .values()
            .flatten()
            .map(|(_, since)| *since + max_age)
            .min()
    }

    /// "X is typing..." line for a conversation, if anyone is.
    pub fn label(&self, conversation_id: &str) -> Option<String> {
        let names: Vec<&str> = self
            .active(conversation_id)
            .into_iter()
            .map(|e| {
                if e.user_name.is_empty() {
                    e.user_id.as_str()
                } else {
                    e.user_name.as_str()
                }
            })
            .collect();
        match names.as_slice() {
            [] => None,
            [one] => Some(format!("{} is typing...", one)),
            [a, b] => Some(format!("{} and {} are typing...", a, b)),
            more => Some(format!("{} people are typing...", more.len())),
        }
    }
}

/// Debounce for the local user's outbound typing signal.
///
/// Every non-empty input change emits `Start` and pushes the deadline out by
/// `timeout`. `Stop` goes out when the deadline passes, when the input becomes
/// empty, or right after a successful send.
#[derive(Debug)]
pub struct TypingDebounce {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl TypingDebounce {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    pub fn on_input(&mut self, text: &str, now: Instant) -> Option<TypingSignal> {
        if text.is_empty() {
            return self.stop();
        }
        self.deadline = Some(now + self.timeout);
        Some(TypingSignal::Start)
    }

    /// Fire the pending stop if its deadline has been reached.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.deadline {
            Some(deadline) if now >= deadline => self.stop(),
            _ => None,
        }
    }

    pub fn on_sent(&mut self) -> Option<TypingSignal> {
        self.stop()
    }

    /// Drop the timer on conversation switch; returns the stop still owed.
    pub fn reset(&mut self) -> Option<TypingSignal> {
        self.stop()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn stop(&mut self) -> Option<TypingSignal> {
        self.deadline.take().map(|_| TypingSignal::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user_id: &str, name: &str) -> TypingEntry {
        TypingEntry {
            user_id: user_id.to_string(),
            user_name: name.to_string(),
            user_name_ar: None,
        }
    }

    #[test]
    fn test_start_has_no_duplicates() {
        let now = Instant::now();
        let mut typing = TypingIndicators::new(None);

        assert!(typing.start("c1", entry("u1", "Karim"), now));
        assert!(!typing.start("c1", entry("u1", "Karim"), now));
        assert!(typing.start("c2", entry("u1", "Karim"), now));

        assert_eq!(typing.active("c1").len(), 1);
        assert_eq!(typing.label("c1").as_deref(), Some("Karim is typing..."));
    }

    #[test]
    fn test_stop_removes_entry() {
        let now = Instant::now();
        let mut typing = TypingIndicators::new(None);
        typing.start("c1", entry("u1", "Karim"), now);
        typing.start("c1", entry("u2", "Sara"), now);
        assert_eq!(
            typing.label("c1").as_deref(),
            Some("Karim and Sara are typing...")
        );

        assert!(typing.stop("c1", "u1"));
        assert!(!typing.stop("c1", "u1"));
        assert_eq!(typing.label("c1").as_deref(), Some("Sara is typing..."));
        assert!(typing.stop("c1", "u2"));
        assert!(typing.label("c1").is_none());
    }

    #[test]
    fn test_remote_entries_persist_without_timeout() {
        let now = Instant::now();
        let mut typing = TypingIndicators::new(None);
        typing.start("c1", entry("u1", "Karim"), now);

        assert_eq!(typing.expire(now + Duration::from_secs(3600)), 0);
        assert_eq!(typing.active("c1").len(), 1);
        assert!(typing.next_expiry().is_none());
    }

    #[test]
    fn test_remote_timeout_retires_silent_entries() {
        let now = Instant::now();
        let mut typing = TypingIndicators::new(Some(Duration::from_secs(10)));
        typing.start("c1", entry("u1", "Karim"), now);
        typing.start("c1", entry("u2", "Sara"), now + Duration::from_secs(5));

        assert_eq!(typing.next_expiry(), Some(now + Duration::from_secs(10)));
        assert_eq!(typing.expire(now + Duration::from_secs(9)), 0);
        assert_eq!(typing.expire(now + Duration::from_secs(10)), 1);
        assert_eq!(typing.label("c1").as_deref(), Some("Sara is typing..."));
    }

    #[test]
    fn test_three_typists_label() {
        let now = Instant::now();
        let mut typing = TypingIndicators::new(None);
        typing.start("c1", entry("u1", "A"), now);
        typing.start("c1", entry("u2", "B"), now);
        typing.start("c1", entry("u3", ""), now);
        assert_eq!(typing.label("c1").as_deref(), Some("3 people are typing..."));
    }

    #[test]
    fn test_debounce_fires_at_timeout_not_before() {
        let t0 = Instant::now();
        let mut debounce = TypingDebounce::new(Duration::from_millis(3000));

        assert_eq!(debounce.on_input("h", t0), Some(TypingSignal::Start));
        assert_eq!(debounce.poll(t0 + Duration::from_millis(2999)), None);
        assert_eq!(
            debounce.poll(t0 + Duration::from_millis(3000)),
            Some(TypingSignal::Stop)
        );
        // Fires once.
        assert_eq!(debounce.poll(t0 + Duration::from_millis(5000)), None);
    }

    #[test]
    fn test_keystroke_resets_deadline() {
        let t0 = Instant::now();
        let mut debounce = TypingDebounce::new(Duration::from_millis(3000));

        debounce.on_input("h", t0);
        let t1 = t0 + Duration::from_millis(2000);
        assert_eq!(debounce.on_input("hi", t1), Some(TypingSignal::Start));

        // The original deadline passes without a stop.
        assert_eq!(debounce.poll(t0 + Duration::from_millis(3500)), None);
        assert_eq!(debounce.deadline(), Some(t1 + Duration::from_millis(3000)));
        assert_eq!(
            debounce.poll(t1 + Duration::from_millis(3000)),
            Some(TypingSignal::Stop)
        );
    }

    #[test]
    fn test_empty_input_and_send_stop_immediately() {
        let t0 = Instant::now();
        let mut debounce = TypingDebounce::new(Duration::from_millis(3000));

        debounce.on_input("x", t0);
        assert_eq!(debounce.on_input("", t0), Some(TypingSignal::Stop));
        assert!(debounce.deadline().is_none());
        assert_eq!(debounce.on_input("", t0), None);

        debounce.on_input("hi", t0);
        assert_eq!(debounce.on_sent(), Some(TypingSignal::Stop));
        assert_eq!(debounce.on_sent(), None);
    }
}
