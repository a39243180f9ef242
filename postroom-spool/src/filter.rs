//! Acceptance policies for [`SpoolStore::accept`](crate::SpoolStore::accept).

use std::time::{Duration, SystemTime};

use ahash::AHashMap;
use postroom_common::{EnvelopeId, State};

/// What a filter gets to see about a spooled entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub id: EnvelopeId,
    pub state: State,
    pub last_updated: SystemTime,
    pub error_message: Option<String>,
}

/// Predicate deciding which entry `accept` may hand out next.
///
/// A scan calls [`accept`](AcceptFilter::accept) for candidates in id order
/// and stops at the first `true`. If nothing was accepted,
/// [`wait_time`](AcceptFilter::wait_time) is asked how long to sleep before
/// rescanning; `None` means sleep until the spool changes.
pub trait AcceptFilter {
    fn accept(&mut self, entry: &EntryInfo) -> bool;

    /// Consulted once after every unsuccessful scan.
    fn wait_time(&mut self) -> Option<Duration>;
}

/// Accepts every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl AcceptFilter for AcceptAll {
    fn accept(&mut self, _entry: &EntryInfo) -> bool {
        true
    }

    fn wait_time(&mut self) -> Option<Duration> {
        None
    }
}

/// Holds back entries in delayed states until they have rested long enough.
///
/// An entry whose state has a configured delay is accepted once
/// `last_updated + delay` has passed; entries in other states are accepted
/// straight away. The filter remembers the earliest moment a deferred entry
/// becomes eligible so that `accept` can sleep exactly that long.
#[derive(Debug, Clone, Default)]
pub struct DelayFilter {
    delays: AHashMap<State, Duration>,
    wake_at: Option<SystemTime>,
}

impl DelayFilter {
    /// A filter delaying [`State::ERROR`] entries by `error_delay`.
    #[must_use]
    pub fn new(error_delay: Duration) -> Self {
        Self::default().with_delay(State::ERROR, error_delay)
    }

    #[must_use]
    pub fn with_delay(mut self, state: State, delay: Duration) -> Self {
        self.delays.insert(state, delay);
        self
    }

    #[must_use]
    pub fn delay_for(&self, state: &State) -> Option<Duration> {
        self.delays.get(state).copied()
    }
}

impl AcceptFilter for DelayFilter {
    fn accept(&mut self, entry: &EntryInfo) -> bool {
        let Some(delay) = self.delays.get(&entry.state) else {
            return true;
        };

        // An unrepresentable wake-up time never becomes eligible.
        let Some(ready_at) = entry.last_updated.checked_add(*delay) else {
            return false;
        };

        if SystemTime::now() >= ready_at {
            return true;
        }

        self.wake_at = Some(self.wake_at.map_or(ready_at, |current| current.min(ready_at)));
        false
    }

    fn wait_time(&mut self) -> Option<Duration> {
        let wake_at = self.wake_at.take()?;
        let remaining = wake_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);

        Some(remaining.max(Duration::from_millis(1)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn entry(state: State, age: Duration) -> EntryInfo {
        EntryInfo {
            id: EnvelopeId::generate(),
            state,
            last_updated: SystemTime::now() - age,
            error_message: None,
        }
    }

    #[test]
    fn test_accept_all() {
        let mut filter = AcceptAll;
        assert!(filter.accept(&entry(State::ERROR, Duration::ZERO)));
        assert_eq!(filter.wait_time(), None);
    }

    #[test]
    fn test_delay_filter_passes_undelayed_states() {
        let mut filter = DelayFilter::new(Duration::from_secs(300));
        assert!(filter.accept(&entry(State::ROOT, Duration::ZERO)));
        assert!(filter.accept(&entry(State::TRANSPORT, Duration::ZERO)));
        assert_eq!(filter.wait_time(), None);
    }

    #[test]
    fn test_delay_filter_defers_young_errors() {
        let mut filter = DelayFilter::new(Duration::from_secs(300));

        assert!(!filter.accept(&entry(State::ERROR, Duration::from_secs(10))));
        assert!(!filter.accept(&entry(State::ERROR, Duration::from_secs(100))));
        assert!(filter.accept(&entry(State::ERROR, Duration::from_secs(301))));

        let wait = filter.wait_time().expect("an entry was deferred");
        assert!(wait <= Duration::from_secs(200));
        assert!(wait > Duration::from_secs(190));

        // The deferral is consumed by the query.
        assert_eq!(filter.wait_time(), None);
    }

    #[test]
    fn test_delay_filter_extra_states() {
        let mut filter = DelayFilter::new(Duration::from_secs(300))
            .with_delay(State::new("retry"), Duration::from_secs(5));

        assert_eq!(
            filter.delay_for(&State::new("retry")),
            Some(Duration::from_secs(5))
        );
        assert!(!filter.accept(&entry(State::new("retry"), Duration::ZERO)));
        assert!(filter.accept(&entry(State::new("retry"), Duration::from_secs(6))));
    }

    #[test]
    fn test_wait_time_has_floor() {
        let mut filter = DelayFilter::new(Duration::from_millis(0));
        filter.wake_at = Some(SystemTime::now() - Duration::from_secs(1));
        assert_eq!(filter.wait_time(), Some(Duration::from_millis(1)));
    }
}
