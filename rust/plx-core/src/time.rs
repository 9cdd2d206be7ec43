//! Duration values with nanosecond resolution, as used by TIME/LTIME.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use thiserror::Error;

pub const NANOS_PER_MICRO: i64 = 1_000;
pub const NANOS_PER_MILLI: i64 = 1_000_000;
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;
pub const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
pub const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;
pub const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("duration out of range")]
    OutOfRange,
}

/// A signed duration stored canonically as integer nanoseconds.
///
/// Covers both TIME and LTIME; the elementary type of a value decides
/// which of the two a duration renders as.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct IecDuration {
    nanos: i64,
}

impl IecDuration {
    pub const ZERO: IecDuration = IecDuration { nanos: 0 };

    pub const fn from_nanos(nanos: i64) -> Self {
        Self { nanos }
    }

    /// Build a duration from calendar components. All components carry the
    /// same sign; mixing signs is rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        days: i64,
        hours: i64,
        minutes: i64,
        seconds: i64,
        millis: i64,
        micros: i64,
        nanos: i64,
    ) -> Result<Self, DurationError> {
        let parts = [days, hours, minutes, seconds, millis, micros, nanos];
        let any_neg = parts.iter().any(|p| *p < 0);
        let any_pos = parts.iter().any(|p| *p > 0);
        if any_neg && any_pos {
            return Err(DurationError::OutOfRange);
        }
        let total = days
            .checked_mul(NANOS_PER_DAY)
            .and_then(|acc| acc.checked_add(hours.checked_mul(NANOS_PER_HOUR)?))
            .and_then(|acc| acc.checked_add(minutes.checked_mul(NANOS_PER_MINUTE)?))
            .and_then(|acc| acc.checked_add(seconds.checked_mul(NANOS_PER_SECOND)?))
            .and_then(|acc| acc.checked_add(millis.checked_mul(NANOS_PER_MILLI)?))
            .and_then(|acc| acc.checked_add(micros.checked_mul(NANOS_PER_MICRO)?))
            .and_then(|acc| acc.checked_add(nanos))
            .ok_or(DurationError::OutOfRange)?;
        Ok(Self { nanos: total })
    }

    pub fn from_seconds(seconds: i64) -> Self {
        Self {
            nanos: seconds.saturating_mul(NANOS_PER_SECOND),
        }
    }

    pub fn from_millis(millis: i64) -> Self {
        Self {
            nanos: millis.saturating_mul(NANOS_PER_MILLI),
        }
    }

    pub const fn as_nanos(&self) -> i64 {
        self.nanos
    }

    pub const fn is_negative(&self) -> bool {
        self.nanos < 0
    }

    pub const fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    pub fn checked_add(self, other: IecDuration) -> Option<IecDuration> {
        self.nanos.checked_add(other.nanos).map(IecDuration::from_nanos)
    }

    pub fn checked_sub(self, other: IecDuration) -> Option<IecDuration> {
        self.nanos.checked_sub(other.nanos).map(IecDuration::from_nanos)
    }

    pub fn checked_mul(self, factor: i64) -> Option<IecDuration> {
        self.nanos.checked_mul(factor).map(IecDuration::from_nanos)
    }
}

impl Neg for IecDuration {
    type Output = IecDuration;

    fn neg(self) -> IecDuration {
        IecDuration {
            nanos: self.nanos.wrapping_neg(),
        }
    }
}

impl fmt::Display for IecDuration {
    /// Renders in IEC literal form, e.g. `T#1d2h3m4s5ms`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.nanos;
        write!(f, "T#")?;
        if rest < 0 {
            write!(f, "-")?;
            rest = rest.wrapping_abs();
        }
        if rest == 0 {
            return write!(f, "0s");
        }
        let units: [(i64, &str); 7] = [
            (NANOS_PER_DAY, "d"),
            (NANOS_PER_HOUR, "h"),
            (NANOS_PER_MINUTE, "m"),
            (NANOS_PER_SECOND, "s"),
            (NANOS_PER_MILLI, "ms"),
            (NANOS_PER_MICRO, "us"),
            (1, "ns"),
        ];
        for (scale, suffix) in units {
            let count = rest / scale;
            if count != 0 {
                write!(f, "{}{}", count, suffix)?;
                rest %= scale;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_accumulate() {
        let d = IecDuration::new(1, 2, 3, 4, 5, 6, 7).unwrap();
        let expected = NANOS_PER_DAY
            + 2 * NANOS_PER_HOUR
            + 3 * NANOS_PER_MINUTE
            + 4 * NANOS_PER_SECOND
            + 5 * NANOS_PER_MILLI
            + 6 * NANOS_PER_MICRO
            + 7;
        assert_eq!(d.as_nanos(), expected);
    }

    #[test]
    fn mixed_signs_rejected() {
        assert_eq!(
            IecDuration::new(1, 0, 0, -1, 0, 0, 0),
            Err(DurationError::OutOfRange)
        );
    }

    #[test]
    fn negative_components_allowed() {
        let d = IecDuration::new(0, 0, 0, -5, 0, 0, 0).unwrap();
        assert_eq!(d.as_nanos(), -5 * NANOS_PER_SECOND);
        assert!(d.is_negative());
    }

    #[test]
    fn overflow_rejected() {
        assert!(IecDuration::new(i64::MAX / 1000, 0, 0, 0, 0, 0, 0).is_err());
    }

    #[test]
    fn display_literal_form() {
        let d = IecDuration::new(1, 2, 0, 4, 500, 0, 0).unwrap();
        assert_eq!(d.to_string(), "T#1d2h4s500ms");
        assert_eq!(IecDuration::ZERO.to_string(), "T#0s");
        assert_eq!(IecDuration::from_seconds(-90).to_string(), "T#-1m30s");
    }
}
