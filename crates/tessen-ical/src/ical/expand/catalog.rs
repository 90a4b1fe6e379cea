//! System timezone catalog.
//!
//! Resolves free-form zone names (IANA aliases, Windows display names,
//! client-specific prefixes) to canonical IANA identifiers via ICU, and
//! synthesizes builtin VTIMEZONE definitions from the `chrono-tz` database
//! so canonicalized documents stay self-contained.

use chrono::{DateTime, Datelike, NaiveDate, Offset, TimeDelta, TimeZone, Utc};
use chrono_tz::{OffsetComponents, OffsetName, Tz};
use icu::time::zone::WindowsParser;
use icu::time::zone::iana::IanaParserExtended;
use std::str::FromStr;

use super::vtimezone::UtcOffset;
use crate::ical::build::serialize_component;
use crate::ical::core::{Component, ComponentKind, DateTime as IcalDateTime, Property};

/// Year whose transitions are sampled when synthesizing observance rules.
const PROBE_YEAR: i32 = 2026;

/// A timezone definition as stored or synthesized: a TZID plus the
/// VTIMEZONE block that defines it.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneDefinition {
    /// The identifier this definition answers to.
    pub tzid: String,
    /// The VTIMEZONE component.
    pub component: Component,
    /// Whether this came from the system catalog rather than user data.
    pub builtin: bool,
}

impl ZoneDefinition {
    /// Wraps a user-provided VTIMEZONE block.
    #[must_use]
    pub fn new(tzid: impl Into<String>, component: Component) -> Self {
        Self {
            tzid: tzid.into(),
            component,
            builtin: false,
        }
    }

    /// Canonical serialization of the definition's rules.
    ///
    /// Byte-identical serializations identify semantically equal zones;
    /// reconciliation compares these instead of structural equality.
    #[must_use]
    pub fn serialized_rules(&self) -> String {
        serialize_component(&self.component)
    }
}

/// Failure of an external zone lookup, distinct from "not found".
#[derive(Debug, thiserror::Error)]
#[error("zone lookup failed: {0}")]
pub struct ZoneLookupError(pub String);

/// Zone lookup backed by the system catalog. Never fails; unknown names
/// resolve to `Ok(None)`.
///
/// ## Errors
/// None in practice; the signature matches pluggable lookups that can fail.
pub fn system_zone_lookup(tzid: &str) -> Result<Option<ZoneDefinition>, ZoneLookupError> {
    Ok(builtin_definition(tzid))
}

/// Resolves a zone name to its canonical IANA identifier, if the system
/// catalog knows it.
#[must_use]
pub fn canonical_tzid(tzid: &str) -> Option<String> {
    let normalized = normalize_zone_name(tzid);
    Tz::from_str(&normalized).ok().map(|tz| tz.name().to_string())
}

/// Builds the builtin definition for a zone name, canonicalizing it first.
#[must_use]
pub fn builtin_definition(tzid: &str) -> Option<ZoneDefinition> {
    let canonical = canonical_tzid(tzid)?;
    let tz = Tz::from_str(&canonical).ok()?;
    Some(ZoneDefinition {
        component: synthesize_vtimezone(&canonical, tz),
        tzid: canonical,
        builtin: true,
    })
}

/// Normalizes client-flavored zone names to IANA spelling.
///
/// Strips vendor prefixes, maps Windows display names through ICU, and
/// canonicalizes IANA aliases (Europe/Kiev -> Europe/Kyiv). Unrecognized
/// names pass through unchanged.
fn normalize_zone_name(tzid: &str) -> String {
    let stripped = tzid
        .strip_prefix("/mozilla.org/")
        .or_else(|| tzid.strip_prefix("/softwarestudio.org/"))
        .unwrap_or(tzid);

    let windows_parser = WindowsParser::new();
    if let Some(tz) = windows_parser.parse(stripped, None) {
        let iana_parser = IanaParserExtended::new();
        for entry in iana_parser.iter() {
            if entry.time_zone == tz {
                return entry.canonical.to_string();
            }
        }
    }

    let iana_parser = IanaParserExtended::new();
    let parsed = iana_parser.parse(stripped);
    if parsed.time_zone != icu::time::TimeZone::UNKNOWN {
        return parsed.canonical.to_string();
    }

    stripped.to_string()
}

fn offset_seconds(tz: Tz, at: DateTime<Utc>) -> i32 {
    tz.offset_from_utc_datetime(&at.naive_utc())
        .fix()
        .local_minus_utc()
}

fn is_dst(tz: Tz, at: DateTime<Utc>) -> bool {
    tz.offset_from_utc_datetime(&at.naive_utc()).dst_offset() != TimeDelta::zero()
}

fn abbreviation(tz: Tz, at: DateTime<Utc>) -> Option<String> {
    tz.offset_from_utc_datetime(&at.naive_utc())
        .abbreviation()
        .map(String::from)
}

/// Synthesizes a VTIMEZONE block for a catalog zone.
///
/// Transitions are sampled over one probe year. Zones without transitions
/// get a single fixed STANDARD observance; zones with DST get one
/// observance per transition, each carrying a yearly recurrence rule
/// derived from the transition's local date.
fn synthesize_vtimezone(canonical: &str, tz: Tz) -> Component {
    let mut vtimezone = Component::timezone();
    vtimezone.add_property(Property::text("TZID", canonical));

    let transitions = probe_transitions(tz);

    if transitions.is_empty() {
        let at = utc_instant(PROBE_YEAR, 1, 1);
        let offset = UtcOffset::from_seconds(offset_seconds(tz, at));
        let mut standard = Component::new(ComponentKind::Standard);
        standard.add_property(Property::datetime(
            "DTSTART",
            IcalDateTime::floating(1970, 1, 1, 0, 0, 0),
        ));
        standard.add_property(Property::text("TZOFFSETFROM", offset.to_string()));
        standard.add_property(Property::text("TZOFFSETTO", offset.to_string()));
        if let Some(name) = abbreviation(tz, at) {
            standard.add_property(Property::text("TZNAME", name));
        }
        vtimezone.add_child(standard);
        return vtimezone;
    }

    for &at in &transitions {
        let offset_to = offset_seconds(tz, at);
        let offset_from = offset_seconds(tz, at - TimeDelta::minutes(1));
        // RFC 5545: observance DTSTART is wall time in the TZOFFSETFROM offset.
        let local = (at + TimeDelta::seconds(i64::from(offset_from))).naive_utc();

        let kind = if is_dst(tz, at) {
            ComponentKind::Daylight
        } else {
            ComponentKind::Standard
        };

        let mut observance = Component::new(kind);
        observance.add_property(Property::datetime("DTSTART", floating_from_naive(local)));
        observance.add_property(Property::text(
            "TZOFFSETFROM",
            UtcOffset::from_seconds(offset_from).to_string(),
        ));
        observance.add_property(Property::text(
            "TZOFFSETTO",
            UtcOffset::from_seconds(offset_to).to_string(),
        ));
        observance.add_property(Property::text("RRULE", yearly_rule(local.date())));
        if let Some(name) = abbreviation(tz, at) {
            observance.add_property(Property::text("TZNAME", name));
        }
        vtimezone.add_child(observance);
    }

    vtimezone
}

/// Scans the probe year for offset changes, refined to minute precision.
fn probe_transitions(tz: Tz) -> Vec<DateTime<Utc>> {
    let start = utc_instant(PROBE_YEAR, 1, 1);
    let end = utc_instant(PROBE_YEAR + 1, 1, 1);

    let mut transitions = Vec::new();
    let mut cursor = start;
    let mut previous = offset_seconds(tz, cursor);

    while cursor < end {
        let next = end.min(cursor + TimeDelta::days(1));
        let current = offset_seconds(tz, next);
        if current != previous {
            transitions.push(refine_transition(tz, cursor, next, previous));
            previous = current;
        }
        cursor = next;
    }

    transitions
}

/// First minute-aligned instant in `(lo, hi]` whose offset differs from
/// `offset_before`.
fn refine_transition(
    tz: Tz,
    mut lo: DateTime<Utc>,
    mut hi: DateTime<Utc>,
    offset_before: i32,
) -> DateTime<Utc> {
    while hi - lo > TimeDelta::minutes(1) {
        let mid = lo + (hi - lo) / 2;
        if offset_seconds(tz, mid) == offset_before {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    hi
}

/// Yearly recurrence matching a transition date: nth weekday of the month,
/// or last when the date falls in the final week.
fn yearly_rule(date: NaiveDate) -> String {
    let weekday = match date.weekday() {
        chrono::Weekday::Sun => "SU",
        chrono::Weekday::Mon => "MO",
        chrono::Weekday::Tue => "TU",
        chrono::Weekday::Wed => "WE",
        chrono::Weekday::Thu => "TH",
        chrono::Weekday::Fri => "FR",
        chrono::Weekday::Sat => "SA",
    };

    let ordinal = if date.day() + 7 > days_in_month(date.year(), date.month()) {
        "-1".to_string()
    } else {
        ((date.day() - 1) / 7 + 1).to_string()
    };

    format!(
        "FREQ=YEARLY;BYMONTH={};BYDAY={}{}",
        date.month(),
        ordinal,
        weekday
    )
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(31, |d| d.day())
}

fn utc_instant(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "probe-year wall clock components fit RFC 5545 field ranges"
)]
fn floating_from_naive(naive: chrono::NaiveDateTime) -> IcalDateTime {
    use chrono::Timelike;

    IcalDateTime::floating(
        naive.year() as u16,
        naive.month() as u8,
        naive.day() as u8,
        naive.hour() as u8,
        naive.minute() as u8,
        naive.second() as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_exact_iana_name() {
        assert_eq!(
            canonical_tzid("America/New_York").as_deref(),
            Some("America/New_York")
        );
    }

    #[test]
    fn canonical_resolves_aliases() {
        assert_eq!(
            canonical_tzid("US/Eastern").as_deref(),
            Some("America/New_York")
        );
        assert_eq!(canonical_tzid("Europe/Kiev").as_deref(), Some("Europe/Kyiv"));
    }

    #[test]
    fn canonical_resolves_windows_names() {
        assert_eq!(
            canonical_tzid("Mountain Standard Time").as_deref(),
            Some("America/Denver")
        );
    }

    #[test]
    fn canonical_rejects_unknown() {
        assert_eq!(canonical_tzid("Not/A_Zone"), None);
    }

    #[test]
    fn builtin_for_fixed_offset_zone() {
        let def = builtin_definition("America/Phoenix").expect("known zone");
        assert!(def.builtin);
        assert_eq!(def.tzid, "America/Phoenix");
        assert_eq!(def.component.tzid(), Some("America/Phoenix"));

        let standards = def.component.children_of_kind(ComponentKind::Standard);
        assert_eq!(standards.len(), 1);
        assert!(
            def.component
                .children_of_kind(ComponentKind::Daylight)
                .is_empty()
        );
        assert_eq!(
            standards[0]
                .get_property("TZOFFSETTO")
                .and_then(Property::as_text),
            Some("-0700")
        );
    }

    #[test]
    fn builtin_for_dst_zone_has_both_observances() {
        let def = builtin_definition("America/New_York").expect("known zone");

        let standard = def.component.children_of_kind(ComponentKind::Standard);
        let daylight = def.component.children_of_kind(ComponentKind::Daylight);
        assert_eq!(standard.len(), 1);
        assert_eq!(daylight.len(), 1);

        assert_eq!(
            standard[0]
                .get_property("TZOFFSETTO")
                .and_then(Property::as_text),
            Some("-0500")
        );
        assert_eq!(
            daylight[0]
                .get_property("TZOFFSETTO")
                .and_then(Property::as_text),
            Some("-0400")
        );
        assert_eq!(
            daylight[0].get_property("RRULE").and_then(Property::as_text),
            Some("FREQ=YEARLY;BYMONTH=3;BYDAY=2SU")
        );
    }

    #[test]
    fn system_lookup_is_total() {
        assert!(system_zone_lookup("America/Denver").unwrap().is_some());
        assert!(system_zone_lookup("Nowhere/Nothing").unwrap().is_none());
    }

    #[test]
    fn serialized_rules_stable_for_same_zone() {
        let a = builtin_definition("Europe/Berlin").unwrap();
        let b = builtin_definition("Europe/Berlin").unwrap();
        assert_eq!(a.serialized_rules(), b.serialized_rules());
    }
}
