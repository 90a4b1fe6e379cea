//! VTIMEZONE offset rules (RFC 5545 §3.6.5).
//!
//! Custom and proprietary zones arrive as VTIMEZONE blocks rather than IANA
//! names. This module evaluates their STANDARD/DAYLIGHT observances well
//! enough to map local wall times to UTC.

use crate::ical::core::{Component, ComponentKind, Property};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

/// Error during VTIMEZONE parsing.
#[derive(Debug, thiserror::Error)]
pub enum VTimezoneError {
    /// Missing required TZID property.
    #[error("missing required TZID property")]
    MissingTzid,

    /// No STANDARD or DAYLIGHT sub-component.
    #[error("VTIMEZONE must have at least one STANDARD or DAYLIGHT component")]
    NoObservances,

    /// Missing required property in an observance.
    #[error("missing required property {0} in {1} component")]
    MissingProperty(&'static str, &'static str),

    /// Invalid property value.
    #[error("invalid {0} value: {1}")]
    InvalidValue(&'static str, String),
}

/// UTC offset in seconds east of UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtcOffset {
    /// Total seconds from UTC (positive = east, negative = west).
    pub seconds: i32,
}

impl UtcOffset {
    /// Creates an offset from total seconds.
    #[must_use]
    pub const fn from_seconds(seconds: i32) -> Self {
        Self { seconds }
    }

    /// Returns the offset as a signed time delta.
    #[must_use]
    pub fn as_delta(self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.seconds))
    }

    /// Parses an offset in iCalendar `(+/-)HHMM[SS]` form.
    ///
    /// ## Errors
    /// Returns [`VTimezoneError::InvalidValue`] for malformed input.
    pub fn parse(s: &str) -> Result<Self, VTimezoneError> {
        let s = s.trim();
        let invalid = || VTimezoneError::InvalidValue("UTC offset", s.to_string());

        let (sign, digits) = match s.split_at_checked(1) {
            Some(("+", rest)) => (1, rest),
            Some(("-", rest)) => (-1, rest),
            _ => return Err(invalid()),
        };
        if digits.len() != 4 && digits.len() != 6 {
            return Err(invalid());
        }

        let field = |range: std::ops::Range<usize>| -> Result<i32, VTimezoneError> {
            digits
                .get(range)
                .and_then(|f| f.parse().ok())
                .ok_or_else(invalid)
        };
        let hours = field(0..2)?;
        let minutes = field(2..4)?;
        let seconds = if digits.len() == 6 { field(4..6)? } else { 0 };

        Ok(Self::from_seconds(
            sign * (hours * 3600 + minutes * 60 + seconds),
        ))
    }
}

impl std::fmt::Display for UtcOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.seconds >= 0 { '+' } else { '-' };
        let total = self.seconds.abs();
        let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
        if seconds == 0 {
            write!(f, "{sign}{hours:02}{minutes:02}")
        } else {
            write!(f, "{sign}{hours:02}{minutes:02}{seconds:02}")
        }
    }
}

/// Kind of observance rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservanceKind {
    /// Standard time.
    Standard,
    /// Daylight saving time.
    Daylight,
}

impl ObservanceKind {
    /// Returns the sub-component name for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Daylight => "DAYLIGHT",
        }
    }
}

/// One STANDARD or DAYLIGHT rule: when an offset takes effect.
#[derive(Debug, Clone, PartialEq)]
pub struct Observance {
    /// Standard or daylight.
    pub kind: ObservanceKind,
    /// Offset in effect once this observance applies.
    pub offset_to: UtcOffset,
    /// Offset in effect just before the transition.
    pub offset_from: UtcOffset,
    /// First transition, as local wall time.
    pub dtstart: NaiveDateTime,
    /// Annual recurrence of the transition, if any.
    pub rrule: Option<String>,
    /// Explicit additional transition dates.
    pub rdates: Vec<NaiveDateTime>,
    /// Zone abbreviation such as "EST".
    pub tzname: Option<String>,
}

/// A parsed VTIMEZONE block.
#[derive(Debug, Clone, PartialEq)]
pub struct VTimezone {
    /// Timezone identifier (TZID property).
    pub tzid: String,
    /// Observance rules in document order.
    pub observances: Vec<Observance>,
}

impl VTimezone {
    /// Parses a VTIMEZONE component.
    ///
    /// ## Errors
    /// Returns an error when the TZID or any required observance property
    /// is missing or malformed.
    pub fn parse(component: &Component) -> Result<Self, VTimezoneError> {
        if component.kind != ComponentKind::Timezone {
            return Err(VTimezoneError::MissingTzid);
        }

        let tzid = component
            .tzid()
            .ok_or(VTimezoneError::MissingTzid)?
            .to_string();

        let mut observances = Vec::new();
        for child in &component.children {
            let kind = match child.kind {
                ComponentKind::Standard => ObservanceKind::Standard,
                ComponentKind::Daylight => ObservanceKind::Daylight,
                _ => continue,
            };
            observances.push(Self::parse_observance(child, kind)?);
        }

        if observances.is_empty() {
            return Err(VTimezoneError::NoObservances);
        }

        Ok(Self { tzid, observances })
    }

    fn parse_observance(
        component: &Component,
        kind: ObservanceKind,
    ) -> Result<Observance, VTimezoneError> {
        let kind_str = kind.as_str();

        let dtstart_ical = component
            .get_property("DTSTART")
            .and_then(Property::as_datetime)
            .ok_or(VTimezoneError::MissingProperty("DTSTART", kind_str))?;
        let dtstart = dtstart_ical
            .as_naive()
            .ok_or_else(|| VTimezoneError::InvalidValue("DTSTART", dtstart_ical.to_string()))?;

        let offset_text = |name: &'static str| -> Result<&str, VTimezoneError> {
            component
                .get_property(name)
                .and_then(Property::as_text)
                .ok_or(VTimezoneError::MissingProperty(name, kind_str))
        };
        let offset_to = UtcOffset::parse(offset_text("TZOFFSETTO")?)?;
        let offset_from = UtcOffset::parse(offset_text("TZOFFSETFROM")?)?;

        let rrule = component
            .get_property("RRULE")
            .and_then(Property::as_text)
            .map(String::from);

        let rdates = component
            .get_properties("RDATE")
            .into_iter()
            .filter_map(Property::as_datetime)
            .filter_map(crate::ical::core::DateTime::as_naive)
            .collect();

        let tzname = component
            .get_property("TZNAME")
            .and_then(Property::as_text)
            .map(String::from);

        Ok(Observance {
            kind,
            offset_to,
            offset_from,
            dtstart,
            rrule,
            rdates,
            tzname,
        })
    }

    /// Returns the UTC offset in effect at the given local wall time.
    ///
    /// The applicable observance is the one with the latest transition at or
    /// before the wall time. Times before every transition use the earliest
    /// observance's `offset_from`.
    #[must_use]
    pub fn offset_at(&self, local: NaiveDateTime) -> UtcOffset {
        let best = self
            .observances
            .iter()
            .filter_map(|obs| effective_date(obs, local).map(|eff| (eff, obs)))
            .max_by_key(|(eff, _)| *eff);

        match best {
            Some((_, obs)) => obs.offset_to,
            None => self
                .observances
                .iter()
                .min_by_key(|o| o.dtstart)
                .map_or(UtcOffset::from_seconds(0), |o| o.offset_from),
        }
    }

    /// Converts a local wall time in this zone to naive UTC.
    #[must_use]
    pub fn to_utc(&self, local: NaiveDateTime) -> NaiveDateTime {
        local - self.offset_at(local).as_delta()
    }
}

/// Latest transition of `obs` at or before `at`, if the observance applies.
fn effective_date(obs: &Observance, at: NaiveDateTime) -> Option<NaiveDateTime> {
    if at < obs.dtstart {
        return None;
    }

    let mut best = obs.dtstart;
    for rdate in &obs.rdates {
        if *rdate <= at && *rdate > best {
            best = *rdate;
        }
    }

    if let Some(rrule) = &obs.rrule
        && let Some(occurrence) = latest_rrule_occurrence(obs, rrule, at)
        && occurrence > best
    {
        best = occurrence;
    }

    Some(best)
}

/// Latest occurrence of a yearly transition rule at or before `at`.
///
/// Zone transition rules in the wild are `FREQ=YEARLY` with `BYMONTH` and an
/// ordinal `BYDAY`; anything else is ignored.
fn latest_rrule_occurrence(
    obs: &Observance,
    rrule: &str,
    at: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let parts: std::collections::HashMap<&str, &str> = rrule
        .split(';')
        .filter_map(|part| part.split_once('='))
        .collect();

    if parts.get("FREQ") != Some(&"YEARLY") {
        return None;
    }
    let bymonth: u32 = parts.get("BYMONTH")?.parse().ok()?;
    let (week_ord, weekday) = parse_byday(parts.get("BYDAY")?)?;

    let mut best: Option<NaiveDateTime> = None;
    for year in obs.dtstart.year()..=at.year() {
        if let Some(occurrence) =
            nth_weekday_of_month(year, bymonth, weekday, week_ord, obs.dtstart.time())
            && occurrence <= at
            && best.is_none_or(|b| occurrence > b)
        {
            best = Some(occurrence);
        }
    }
    best
}

/// Parses a BYDAY value like `1SU`, `-1SU`, `2MO` into (ordinal, weekday).
fn parse_byday(s: &str) -> Option<(i32, chrono::Weekday)> {
    use chrono::Weekday;

    let s = s.trim();
    if s.len() < 2 {
        return None;
    }

    let (num_part, day_part) = s.split_at(s.len() - 2);
    let ord: i32 = if num_part.is_empty() {
        0
    } else {
        num_part.parse().ok()?
    };

    let weekday = match day_part.to_ascii_uppercase().as_str() {
        "SU" => Weekday::Sun,
        "MO" => Weekday::Mon,
        "TU" => Weekday::Tue,
        "WE" => Weekday::Wed,
        "TH" => Weekday::Thu,
        "FR" => Weekday::Fri,
        "SA" => Weekday::Sat,
        _ => return None,
    };

    Some((ord, weekday))
}

/// Nth occurrence of a weekday within a month; negative ordinals count from
/// the end (-1 = last).
#[expect(
    clippy::cast_sign_loss,
    reason = "day-of-month arithmetic stays within 1..=31 by construction"
)]
fn nth_weekday_of_month(
    year: i32,
    month: u32,
    weekday: chrono::Weekday,
    week_ord: i32,
    time: NaiveTime,
) -> Option<NaiveDateTime> {
    if week_ord == 0 {
        return None;
    }

    let weekday_num = |w: chrono::Weekday| w.num_days_from_monday().cast_signed();

    let day = if week_ord > 0 {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let days_until = (weekday_num(weekday) - weekday_num(first.weekday())).rem_euclid(7);
        1 + days_until + (week_ord - 1) * 7
    } else {
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
        let days_back = (weekday_num(last.weekday()) - weekday_num(weekday)).rem_euclid(7);
        last.day().cast_signed() - days_back + (week_ord + 1) * 7
    };

    if day < 1 {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(year, month, day as u32)?;
    Some(NaiveDateTime::new(date, time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDateTime::new(
            NaiveDate::from_ymd_opt(y, mo, d).unwrap(),
            NaiveTime::from_hms_opt(h, mi, 0).unwrap(),
        )
    }

    fn us_eastern() -> VTimezone {
        VTimezone {
            tzid: "US/Eastern".to_string(),
            observances: vec![
                Observance {
                    kind: ObservanceKind::Standard,
                    offset_to: UtcOffset::from_seconds(-5 * 3600),
                    offset_from: UtcOffset::from_seconds(-4 * 3600),
                    dtstart: naive(1970, 11, 1, 2, 0),
                    rrule: Some("FREQ=YEARLY;BYMONTH=11;BYDAY=1SU".to_string()),
                    rdates: vec![],
                    tzname: Some("EST".to_string()),
                },
                Observance {
                    kind: ObservanceKind::Daylight,
                    offset_to: UtcOffset::from_seconds(-4 * 3600),
                    offset_from: UtcOffset::from_seconds(-5 * 3600),
                    dtstart: naive(1970, 3, 8, 2, 0),
                    rrule: Some("FREQ=YEARLY;BYMONTH=3;BYDAY=2SU".to_string()),
                    rdates: vec![],
                    tzname: Some("EDT".to_string()),
                },
            ],
        }
    }

    #[test]
    fn utc_offset_parse() {
        assert_eq!(UtcOffset::parse("+0500").unwrap().seconds, 5 * 3600);
        assert_eq!(UtcOffset::parse("-0800").unwrap().seconds, -8 * 3600);
        assert_eq!(
            UtcOffset::parse("+053000").unwrap().seconds,
            5 * 3600 + 30 * 60
        );
        assert!(UtcOffset::parse("0500").is_err());
        assert!(UtcOffset::parse("+05").is_err());
    }

    #[test]
    fn utc_offset_display() {
        assert_eq!(UtcOffset::from_seconds(5 * 3600).to_string(), "+0500");
        assert_eq!(UtcOffset::from_seconds(-8 * 3600).to_string(), "-0800");
        assert_eq!(
            UtcOffset::from_seconds(-(4 * 3600 + 30 * 60 + 15)).to_string(),
            "-043015"
        );
    }

    #[test]
    fn byday_parse() {
        assert_eq!(parse_byday("1SU"), Some((1, chrono::Weekday::Sun)));
        assert_eq!(parse_byday("-1SU"), Some((-1, chrono::Weekday::Sun)));
        assert_eq!(parse_byday("2MO"), Some((2, chrono::Weekday::Mon)));
        assert_eq!(parse_byday("XX"), None);
    }

    #[test]
    fn nth_weekday_forward_and_backward() {
        let time = NaiveTime::from_hms_opt(2, 0, 0).unwrap();
        assert_eq!(
            nth_weekday_of_month(2026, 3, chrono::Weekday::Sun, 2, time),
            Some(naive(2026, 3, 8, 2, 0))
        );
        assert_eq!(
            nth_weekday_of_month(2026, 10, chrono::Weekday::Sun, -1, time),
            Some(naive(2026, 10, 25, 2, 0))
        );
        assert_eq!(
            nth_weekday_of_month(2026, 11, chrono::Weekday::Sun, 1, time),
            Some(naive(2026, 11, 1, 2, 0))
        );
    }

    #[test]
    fn offset_tracks_dst_transitions() {
        let tz = us_eastern();
        assert_eq!(tz.offset_at(naive(2026, 1, 15, 12, 0)).seconds, -5 * 3600);
        assert_eq!(tz.offset_at(naive(2026, 7, 15, 12, 0)).seconds, -4 * 3600);
    }

    #[test]
    fn to_utc_fixed_offset_zone() {
        let tz = VTimezone {
            tzid: "Asia/Kolkata".to_string(),
            observances: vec![Observance {
                kind: ObservanceKind::Standard,
                offset_to: UtcOffset::from_seconds(5 * 3600 + 30 * 60),
                offset_from: UtcOffset::from_seconds(5 * 3600 + 30 * 60),
                dtstart: naive(1970, 1, 1, 0, 0),
                rrule: None,
                rdates: vec![],
                tzname: Some("IST".to_string()),
            }],
        };

        assert_eq!(tz.to_utc(naive(2026, 1, 15, 12, 0)), naive(2026, 1, 15, 6, 30));
    }

    #[test]
    fn parse_requires_observances() {
        let mut component = Component::timezone();
        component.add_property(crate::ical::core::Property::text("TZID", "Empty/Zone"));
        assert!(matches!(
            VTimezone::parse(&component),
            Err(VTimezoneError::NoObservances)
        ));
    }
}
