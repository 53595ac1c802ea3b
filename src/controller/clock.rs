//! Wall-clock source for the reconciler
//!
//! Condition transition times and the terminating-pod grace comparison both
//! read the time through `Context::clock`, so tests can pin it.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// `instant` lies strictly before the current time
    fn has_passed(&self, instant: DateTime<Utc>) -> bool {
        instant < self.now()
    }
}

/// Reads `Utc::now()`
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a chosen instant until moved explicitly
#[cfg(test)]
#[allow(clippy::expect_used)]
pub struct MockClock {
    instant: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl MockClock {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            instant: std::sync::Mutex::new(instant),
        }
    }

    #[allow(dead_code)]
    pub fn advance(&self, by: chrono::Duration) {
        *self.instant.lock().expect("MockClock lock poisoned") += by;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock().expect("MockClock lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_has_passed_is_strict() {
        let start = Utc::now();
        let clock = MockClock::at(start);

        assert!(clock.has_passed(start - Duration::seconds(1)));
        assert!(!clock.has_passed(start));
        assert!(!clock.has_passed(start + Duration::seconds(30)));
    }

    #[test]
    fn test_advance_moves_past_deadline() {
        let start = Utc::now();
        let clock = MockClock::at(start);
        let deadline = start + Duration::seconds(30);

        clock.advance(Duration::seconds(31));
        assert!(clock.has_passed(deadline));
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now().timestamp() > 1_577_836_800);
    }
}
