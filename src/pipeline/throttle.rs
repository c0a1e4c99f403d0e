/// Minimum spacing between persisted readings
use time::{Duration, OffsetDateTime};

/// Sliding floor measured from the last forwarded reading.
///
/// Starts out open: the first reading of a session is always forwarded.
#[derive(Debug, Clone)]
pub struct ThrottleGate {
    interval: Duration,
    last_forwarded_at: Option<OffsetDateTime>,
}

impl ThrottleGate {
    pub fn new(interval: Duration) -> Self {
        ThrottleGate {
            interval,
            last_forwarded_at: None,
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::seconds(secs.min(i64::MAX as u64) as i64))
    }

    pub fn last_forwarded_at(&self) -> Option<OffsetDateTime> {
        self.last_forwarded_at
    }

    /// Whether a reading observed at `now` may be forwarded. Inclusive at the boundary.
    pub fn should_forward(&self, now: OffsetDateTime) -> bool {
        if self.interval.is_zero() {
            return true;
        }
        match self.last_forwarded_at {
            None => true,
            Some(last) => now - last >= self.interval,
        }
    }

    /// Restart the interval at `now`. Call only for a reading that was forwarded.
    pub fn record(&mut self, now: OffsetDateTime) {
        self.last_forwarded_at = Some(now);
    }
}
