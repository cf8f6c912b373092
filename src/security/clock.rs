// src/security/clock.rs - Injectable time source
use chrono::{DateTime, Duration, FixedOffset, Local, Offset, TimeZone, Timelike, Utc};
use parking_lot::Mutex;

/// Wall-clock source for every time-dependent rule in the engine
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Hour of day in the operator's local time zone
    fn local_hour(&self) -> u32 {
        self.now().with_timezone(&Local).hour()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock with a fixed local offset, used by tests and simulations
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
            offset: Utc.fix(),
        }
    }

    /// Clock set to the given UTC hour on a fixed calendar day
    pub fn starting_at_hour(hour: u32) -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 15, hour % 24, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start)
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = *now + by;
    }

    pub fn advance_secs(&self, seconds: i64) {
        self.advance(Duration::seconds(seconds));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn local_hour(&self) -> u32 {
        self.now().with_timezone(&self.offset).hour()
    }
}

/// Non-negative seconds between two instants
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds().max(0) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::starting_at_hour(10);
        let start = clock.now();
        clock.advance_secs(90);

        assert_eq!(seconds_between(start, clock.now()), 90.0);
        assert_eq!(clock.local_hour(), 10);
    }

    #[test]
    fn test_manual_clock_local_offset() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let clock = ManualClock::starting_at_hour(23).with_offset(offset);
        assert_eq!(clock.local_hour(), 2);
    }

    #[test]
    fn test_seconds_between_never_negative() {
        let now = Utc::now();
        assert_eq!(seconds_between(now, now - Duration::seconds(5)), 0.0);
    }
}
