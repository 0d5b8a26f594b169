//! Typing indicators.
//!
//! [`TypingDebounce`] turns a burst of local keystrokes into one start and one
//! stop notification. [`TypingPresence`] tracks which remote users are typing
//! in the open conversation.

use std::{collections::BTreeSet, ops::Sub, time::Duration};

use parley_proto::UserId;

/// Leading-edge start, trailing-edge stop debounce.
#[derive(Debug, Clone)]
pub struct TypingDebounce<I> {
    idle: Duration,
    last_keystroke: Option<I>,
}

impl<I> TypingDebounce<I>
where
    I: Copy + Sub<Output = Duration>,
{
    /// Debounce with the given quiet period.
    pub fn new(idle: Duration) -> Self {
        Self { idle, last_keystroke: None }
    }

    /// Record a keystroke. Returns true on the leading edge of a burst.
    pub fn keystroke(&mut self, now: I) -> bool {
        self.last_keystroke.replace(now).is_none()
    }

    /// Returns true once when the quiet period has elapsed since the last
    /// keystroke, ending the burst.
    pub fn poll_expired(&mut self, now: I) -> bool {
        match self.last_keystroke {
            Some(last) if now - last >= self.idle => {
                self.last_keystroke = None;
                true
            },
            _ => false,
        }
    }

    /// End the burst early. Returns true if one was in progress.
    pub fn cancel(&mut self) -> bool {
        self.last_keystroke.take().is_some()
    }

    /// Returns true while a burst is in progress.
    pub fn is_active(&self) -> bool {
        self.last_keystroke.is_some()
    }
}

/// Remote users currently typing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingPresence {
    users: BTreeSet<UserId>,
}

impl TypingPresence {
    /// Returns true if the user was not already present.
    pub fn insert(&mut self, user_id: UserId) -> bool {
        self.users.insert(user_id)
    }

    /// Returns true if the user was present.
    pub fn remove(&mut self, user_id: &UserId) -> bool {
        self.users.remove(user_id)
    }

    /// Returns true if anyone was present.
    pub fn clear(&mut self) -> bool {
        let changed = !self.users.is_empty();
        self.users.clear();
        changed
    }

    /// Returns true if the user is typing.
    pub fn contains(&self, user_id: &UserId) -> bool {
        self.users.contains(user_id)
    }

    /// Typing users, sorted.
    pub fn snapshot(&self) -> Vec<UserId> {
        self.users.iter().cloned().collect()
    }

    /// Returns true if nobody is typing.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn burst_produces_single_start_and_stop() {
        let mut debounce = TypingDebounce::new(ms(1000));
        let starts = [0, 50, 100, 150, 200].into_iter().filter(|&t| debounce.keystroke(ms(t))).count();
        assert_eq!(starts, 1);

        assert!(!debounce.poll_expired(ms(1199)));
        assert!(debounce.poll_expired(ms(1200)));
        assert!(!debounce.poll_expired(ms(5000)));
    }

    #[test]
    fn keystrokes_extend_the_quiet_period() {
        let mut debounce = TypingDebounce::new(ms(1000));
        debounce.keystroke(ms(0));
        debounce.keystroke(ms(900));
        assert!(!debounce.poll_expired(ms(1500)));
        assert!(debounce.poll_expired(ms(1900)));
        assert!(debounce.keystroke(ms(2000)));
    }

    #[test]
    fn cancel_reports_whether_burst_was_active() {
        let mut debounce = TypingDebounce::new(ms(1000));
        assert!(!debounce.cancel());
        debounce.keystroke(ms(0));
        assert!(debounce.cancel());
        assert!(!debounce.is_active());
    }

    #[test]
    fn presence_reports_changes_only() {
        let mut presence = TypingPresence::default();
        let alice = UserId::new("alice").expect("id");

        assert!(presence.insert(alice.clone()));
        assert!(!presence.insert(alice.clone()));
        assert_eq!(presence.snapshot(), vec![alice.clone()]);
        assert!(presence.remove(&alice));
        assert!(!presence.remove(&alice));
        assert!(!presence.clear());
    }
}
