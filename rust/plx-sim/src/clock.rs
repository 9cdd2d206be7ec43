//! The virtual clock: integer nanoseconds, monotonic, advanced only by
//! explicit ticks.

use plx_core::time::IecDuration;

#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualClock {
    now_ns: i64,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ns(&self) -> i64 {
        self.now_ns
    }

    /// Advance by a non-negative duration. Time never moves backwards.
    pub fn tick(&mut self, duration: IecDuration) -> Result<(), NonMonotonicTick> {
        if duration.is_negative() {
            return Err(NonMonotonicTick { duration });
        }
        self.now_ns = self.now_ns.saturating_add(duration.as_nanos());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot tick the clock backwards by {duration}")]
pub struct NonMonotonicTick {
    pub duration: IecDuration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_accumulate() {
        let mut clock = VirtualClock::new();
        clock.tick(IecDuration::from_seconds(2)).unwrap();
        clock.tick(IecDuration::from_millis(500)).unwrap();
        assert_eq!(clock.now_ns(), 2_500_000_000);
    }

    #[test]
    fn negative_tick_rejected() {
        let mut clock = VirtualClock::new();
        assert!(clock.tick(IecDuration::from_seconds(-1)).is_err());
        assert_eq!(clock.now_ns(), 0);
    }
}
