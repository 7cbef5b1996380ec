//! Wall-clock time
//!
//! Receipt codes embed the current year, so the clock is injected rather
//! than read ambiently.

use chrono::{DateTime, Datelike, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Source of physical time
pub trait ClockEffects: Send + Sync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar year
    fn current_year(&self) -> i32 {
        self.now().year()
    }
}

/// Clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockEffects for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl FixedClock {
    /// Freeze the clock at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(now)),
        }
    }

    /// Move the clock to `now`
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }
}

impl ClockEffects for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

impl<C: ClockEffects + ?Sized> ClockEffects for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_reports_the_year_it_was_set_to() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
        assert_eq!(clock.current_year(), 2025);

        clock.set(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(clock.current_year(), 2026);
    }
}
