//! iCalendar DURATION value type (RFC 5545 §3.3.6).

use std::fmt;

/// Duration value (RFC 5545 §3.3.6).
///
/// Either week-based (`P1W`) or day/time-based (`P1DT2H30M`). iCalendar
/// durations have no year/month designators because months have variable
/// lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Duration {
    /// Whether this duration is negative.
    pub negative: bool,
    /// Number of weeks (mutually exclusive with days/hours/minutes/seconds).
    pub weeks: u32,
    /// Number of days.
    pub days: u32,
    /// Number of hours.
    pub hours: u32,
    /// Number of minutes.
    pub minutes: u32,
    /// Number of seconds.
    pub seconds: u32,
}

impl Duration {
    /// Creates a new zero duration.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            negative: false,
            weeks: 0,
            days: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }

    /// Creates a duration from days.
    #[must_use]
    pub const fn days(days: u32) -> Self {
        Self { days, ..Self::zero() }
    }

    /// Creates a duration from hours.
    #[must_use]
    pub const fn hours(hours: u32) -> Self {
        Self {
            hours,
            ..Self::zero()
        }
    }

    /// Creates a duration from minutes.
    #[must_use]
    pub const fn minutes(minutes: u32) -> Self {
        Self {
            minutes,
            ..Self::zero()
        }
    }

    /// Negates this duration.
    #[must_use]
    pub const fn negate(mut self) -> Self {
        self.negative = !self.negative;
        self
    }

    /// Returns the total duration as seconds.
    #[must_use]
    pub const fn as_seconds(&self) -> i64 {
        let total = (self.weeks as i64 * 7 * 24 * 3600)
            + (self.days as i64 * 24 * 3600)
            + (self.hours as i64 * 3600)
            + (self.minutes as i64 * 60)
            + (self.seconds as i64);

        if self.negative { -total } else { total }
    }

    /// Returns the duration as a `chrono::TimeDelta`.
    #[must_use]
    pub fn as_delta(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::seconds(self.as_seconds())
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "P")?;

        if self.weeks > 0 {
            write!(f, "{}W", self.weeks)?;
        } else {
            if self.days > 0 {
                write!(f, "{}D", self.days)?;
            }
            if self.hours > 0 || self.minutes > 0 || self.seconds > 0 {
                write!(f, "T")?;
                if self.hours > 0 {
                    write!(f, "{}H", self.hours)?;
                }
                if self.minutes > 0 {
                    write!(f, "{}M", self.minutes)?;
                }
                if self.seconds > 0 {
                    write!(f, "{}S", self.seconds)?;
                }
            } else if self.days == 0 {
                // Zero duration: P0D
                write!(f, "0D")?;
            } else {
                // Days > 0 with no time components - already written
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_display() {
        assert_eq!(Duration::days(1).to_string(), "P1D");
        assert_eq!(Duration::minutes(15).to_string(), "PT15M");
        assert_eq!(Duration::minutes(15).negate().to_string(), "-PT15M");
        assert_eq!(Duration::zero().to_string(), "P0D");
    }

    #[test]
    fn duration_as_seconds() {
        assert_eq!(Duration::hours(2).as_seconds(), 2 * 3600);
        assert_eq!(Duration::minutes(15).negate().as_seconds(), -15 * 60);
    }
}
