//! Bounded, time-windowed record of mentions a bot has already handled.
//!
//! An entry's window restarts every time the platform lists the mention
//! again, so an id only expires once the platform has stopped returning it
//! for a whole window. Dated mentions are additionally cut off by age in
//! [`super::Bot::poll_once`], so an expired entry never leads to a second
//! reply. When the set is full the least recently observed id goes first.
//! The set lives in memory only.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct SeenSet {
    capacity: usize,
    window: Duration,
    last_seen: HashMap<String, Instant>,
}

impl SeenSet {
    /// A set holding at most `capacity` ids, each for at most `window`
    /// after it was last observed.
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
            last_seen: HashMap::new(),
        }
    }

    /// Whether `id` is tracked. A tracked id has its window restarted.
    pub fn refresh(&mut self, id: &str) -> bool {
        self.refresh_at(id, Instant::now())
    }

    pub fn insert(&mut self, id: &str) {
        self.insert_at(id, Instant::now());
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    fn refresh_at(&mut self, id: &str, now: Instant) -> bool {
        self.expire(now);
        match self.last_seen.get_mut(id) {
            Some(seen_at) => {
                *seen_at = now;
                true
            }
            None => false,
        }
    }

    fn insert_at(&mut self, id: &str, now: Instant) {
        self.expire(now);
        self.last_seen.insert(id.to_string(), now);
        while self.last_seen.len() > self.capacity {
            let oldest = self
                .last_seen
                .iter()
                .min_by_key(|(_, seen_at)| **seen_at)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(oldest) => self.last_seen.remove(&oldest),
                None => break,
            };
        }
    }

    fn expire(&mut self, now: Instant) {
        let window = self.window;
        self.last_seen
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) < window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_refresh() {
        let mut seen = SeenSet::new(10, Duration::from_secs(60));
        assert!(!seen.refresh("a"));
        seen.insert("a");
        seen.insert("a");
        assert!(seen.refresh("a"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_least_recently_observed() {
        let mut seen = SeenSet::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        seen.insert_at("a", t0);
        seen.insert_at("b", t0 + Duration::from_secs(1));
        assert!(seen.refresh_at("a", t0 + Duration::from_secs(2)));
        seen.insert_at("c", t0 + Duration::from_secs(3));

        let now = t0 + Duration::from_secs(4);
        assert!(seen.refresh_at("a", now));
        assert!(!seen.refresh_at("b", now));
        assert!(seen.refresh_at("c", now));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_window_expires_entries() {
        let mut seen = SeenSet::new(10, Duration::from_secs(60));
        let t0 = Instant::now();
        seen.insert_at("old", t0);
        seen.insert_at("new", t0 + Duration::from_secs(30));
        let later = t0 + Duration::from_secs(61);
        assert!(!seen.refresh_at("old", later));
        assert!(seen.refresh_at("new", later));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_observation_restarts_window() {
        let mut seen = SeenSet::new(10, Duration::from_secs(60));
        let t0 = Instant::now();
        seen.insert_at("m1", t0);
        assert!(seen.refresh_at("m1", t0 + Duration::from_secs(50)));
        assert!(seen.refresh_at("m1", t0 + Duration::from_secs(100)));
        assert!(!seen.refresh_at("m1", t0 + Duration::from_secs(161)));
    }

    #[test]
    fn test_zero_capacity_still_remembers_latest() {
        let mut seen = SeenSet::new(0, Duration::from_secs(60));
        seen.insert("x");
        assert!(seen.refresh("x"));
    }
}
