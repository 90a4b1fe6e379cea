//! TZID resolution and UTC conversion.
//!
//! TZIDs in the wild are messy: copies of system names with stray suffixes
//! (`America/Denver 1`), enterprise decorations (`America/Denver-(Standard)`),
//! vendor path prefixes, and Windows display names. [`match_tzid`] maps all
//! of these onto canonical system zone names where possible.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::str::FromStr;

use super::catalog::{self, ZoneDefinition, ZoneLookupError};
use super::vtimezone::VTimezone;
use crate::ical::core::{Component, ComponentKind, DateTime as IcalDateTime, DateTimeForm};

/// Error during local-to-UTC conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// TZID resolves to neither a document zone nor a system zone.
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    /// The wall time falls in a DST gap and does not exist.
    #[error("non-existent time (DST gap): {0}")]
    NonExistentTime(String),

    /// Out-of-range date or time components.
    #[error("invalid datetime: {0}")]
    InvalidDateTime(String),
}

/// Matches a fuzzy TZID against the system zone catalog.
///
/// Returns the canonical system name, or `None` when nothing matches or the
/// match is UTC (UTC references need no zone definition).
///
/// The search order:
/// 1. Strip trailing digits, then trailing whitespace, and retry with the
///    stripped name. Catches rename suffixes like `America/Denver 1`.
/// 2. Probe the name and every `/`-separated tail of it as a location,
///    first verbatim and then with everything from the last `-` removed.
///    First hit wins.
#[must_use]
pub fn match_tzid(tzid: &str) -> Option<String> {
    raw_match(tzid).filter(|hit| hit != "UTC" && hit != "Etc/UTC")
}

fn raw_match(tzid: &str) -> Option<String> {
    let stripped = tzid
        .trim_end_matches(|c: char| c.is_ascii_digit())
        .trim_end();
    if stripped.len() < tzid.len()
        && !stripped.is_empty()
        && let Some(hit) = match_tzid(stripped)
    {
        return Some(hit);
    }

    let mut location = tzid;
    loop {
        if let Some(hit) = match_location(location) {
            return Some(hit);
        }
        match location.find('/') {
            Some(slash) => location = &location[slash + 1..],
            None => return None,
        }
    }
}

/// Exact catalog lookup, retried once with a `-suffix` removed to handle
/// decorated names like `America/Denver-(Standard)`.
fn match_location(location: &str) -> Option<String> {
    if let Some(hit) = catalog::canonical_tzid(location) {
        return Some(hit);
    }
    let (head, _) = location.rsplit_once('-')?;
    catalog::canonical_tzid(head)
}

/// Converts zone-qualified wall times to UTC instants.
///
/// Document-defined VTIMEZONE blocks take priority; unknown TZIDs fall back
/// to the pluggable zone lookup and finally to direct IANA resolution.
pub struct ZoneConverter<F> {
    lookup: F,
    vtimezones: HashMap<String, VTimezone>,
    iana_cache: HashMap<String, Tz>,
}

impl<F> ZoneConverter<F>
where
    F: FnMut(&str) -> Result<Option<ZoneDefinition>, ZoneLookupError>,
{
    /// Creates a converter backed by the given zone lookup.
    pub fn new(lookup: F) -> Self {
        Self {
            lookup,
            vtimezones: HashMap::new(),
            iana_cache: HashMap::new(),
        }
    }

    /// Registers a parsed VTIMEZONE for priority resolution.
    pub fn register_vtimezone(&mut self, vtimezone: VTimezone) {
        self.vtimezones.insert(vtimezone.tzid.clone(), vtimezone);
    }

    /// Registers every valid VTIMEZONE found in a component slice.
    /// Invalid blocks are skipped with a diagnostic.
    pub fn register_document_zones(&mut self, components: &[Component]) {
        for component in components {
            if component.kind != ComponentKind::Timezone {
                continue;
            }
            match VTimezone::parse(component) {
                Ok(vtimezone) => self.register_vtimezone(vtimezone),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping invalid VTIMEZONE block");
                }
            }
        }
    }

    /// Converts an iCalendar date-time to an absolute UTC instant.
    ///
    /// Floating times are interpreted as UTC.
    ///
    /// ## Errors
    /// Returns [`ConversionError`] when the components are out of range, the
    /// TZID is unresolvable, or the wall time falls in a DST gap.
    pub fn to_utc(&mut self, dt: &IcalDateTime) -> Result<DateTime<Utc>, ConversionError> {
        let naive = dt
            .as_naive()
            .ok_or_else(|| ConversionError::InvalidDateTime(dt.to_string()))?;

        match &dt.form {
            DateTimeForm::Utc | DateTimeForm::Floating => {
                Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
            }
            DateTimeForm::Zoned { tzid } => self.convert_local(naive, tzid),
        }
    }

    fn convert_local(
        &mut self,
        local: NaiveDateTime,
        tzid: &str,
    ) -> Result<DateTime<Utc>, ConversionError> {
        if !self.vtimezones.contains_key(tzid)
            && let Ok(Some(definition)) = (self.lookup)(tzid)
            && let Ok(vtimezone) = VTimezone::parse(&definition.component)
        {
            self.vtimezones.insert(tzid.to_string(), vtimezone);
        }

        if let Some(vtimezone) = self.vtimezones.get(tzid) {
            return Ok(DateTime::from_naive_utc_and_offset(
                vtimezone.to_utc(local),
                Utc,
            ));
        }

        let tz = self.resolve_iana(tzid)?;
        match tz.from_local_datetime(&local) {
            LocalResult::None => Err(ConversionError::NonExistentTime(format!(
                "{local} in timezone {tzid}"
            ))),
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            // DST fold: RFC 5545 §3.3.5 picks the occurrence before the shift.
            LocalResult::Ambiguous(first, _) => Ok(first.with_timezone(&Utc)),
        }
    }

    fn resolve_iana(&mut self, tzid: &str) -> Result<Tz, ConversionError> {
        if let Some(tz) = self.iana_cache.get(tzid) {
            return Ok(*tz);
        }

        let canonical = catalog::canonical_tzid(tzid)
            .or_else(|| match_tzid(tzid))
            .ok_or_else(|| ConversionError::UnknownTimezone(tzid.to_string()))?;
        let tz = Tz::from_str(&canonical)
            .map_err(|_| ConversionError::UnknownTimezone(tzid.to_string()))?;

        self.iana_cache.insert(tzid.to_string(), tz);
        Ok(tz)
    }
}
