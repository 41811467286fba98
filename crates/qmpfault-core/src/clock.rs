//! Simulated time as observed by the client.
//!
//! The client never reads the target's virtual clock directly; it learns the
//! current simulated time from the `time_ns` carried by each fault event.

use crate::{config::ClockPolicy, error::SessionError};

/// Last simulated time reported by the target, in nanoseconds.
///
/// # Invariants
///
/// - Never decreases
/// - Only advanced from fault events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimClock {
    now_ns: u64,
}

impl SimClock {
    /// Clock at simulated time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time.
    pub fn now_ns(&self) -> u64 {
        self.now_ns
    }

    /// Move the clock to `observed_ns`.
    ///
    /// Returns `true` if the clock took the new value. Under
    /// [`ClockPolicy::Lenient`] a regression leaves the clock unchanged and
    /// returns `false`.
    ///
    /// # Errors
    ///
    /// - `SessionError::ClockRegression` under [`ClockPolicy::Strict`] if
    ///   `observed_ns` is earlier than the current value
    pub fn advance(&mut self, observed_ns: u64, policy: ClockPolicy) -> Result<bool, SessionError> {
        if observed_ns < self.now_ns {
            return match policy {
                ClockPolicy::Strict => Err(SessionError::ClockRegression {
                    current_ns: self.now_ns,
                    observed_ns,
                }),
                ClockPolicy::Lenient => Ok(false),
            };
        }

        self.now_ns = observed_ns;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn equal_time_is_accepted() {
        let mut clock = SimClock::new();
        assert!(clock.advance(500, ClockPolicy::Strict).unwrap());
        assert!(clock.advance(500, ClockPolicy::Strict).unwrap());
        assert_eq!(clock.now_ns(), 500);
    }

    #[test]
    fn strict_rejects_regression() {
        let mut clock = SimClock::new();
        clock.advance(1000, ClockPolicy::Strict).unwrap();
        let err = clock.advance(999, ClockPolicy::Strict).unwrap_err();
        assert!(matches!(err, SessionError::ClockRegression { current_ns: 1000, observed_ns: 999 }));
        assert_eq!(clock.now_ns(), 1000);
    }

    #[test]
    fn lenient_keeps_current_value() {
        let mut clock = SimClock::new();
        clock.advance(1000, ClockPolicy::Lenient).unwrap();
        assert!(!clock.advance(10, ClockPolicy::Lenient).unwrap());
        assert_eq!(clock.now_ns(), 1000);
    }

    proptest! {
        #[test]
        fn prop_clock_ends_at_last_time(mut times in prop::collection::vec(any::<u64>(), 1..50)) {
            times.sort_unstable();
            let mut clock = SimClock::new();
            for &t in &times {
                clock.advance(t, ClockPolicy::Strict).unwrap();
            }
            prop_assert_eq!(clock.now_ns(), *times.last().unwrap());
        }

        #[test]
        fn prop_lenient_clock_never_decreases(times in prop::collection::vec(any::<u64>(), 1..50)) {
            let mut clock = SimClock::new();
            let mut previous = 0;
            for t in times {
                clock.advance(t, ClockPolicy::Lenient).unwrap();
                prop_assert!(clock.now_ns() >= previous);
                previous = clock.now_ns();
            }
        }
    }
}
