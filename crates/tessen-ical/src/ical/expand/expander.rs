//! Recurrence expansion into concrete instances.
//!
//! Scheduled components are partitioned per UID into at most one master and
//! any number of detached overrides (components carrying RECURRENCE-ID).
//! Masters are expanded against the requested window with the `rrule` crate
//! as the evaluator; overrides are then merged into the generated instances
//! by recurrence identity and RANGE semantics. Overrides that match no
//! master survive as orphans and are delivered after every owned series.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use rrule::{RRule, Unvalidated};

use super::catalog::{ZoneDefinition, ZoneLookupError};
use super::timezone::ZoneConverter;
use crate::ical::core::{Component, DateTime as IcalDateTime, Property, Value};

/// Tuning knobs for expansion.
#[derive(Debug, Clone)]
pub struct ExpandOptions {
    /// Upper bound on occurrences generated for one recurring series.
    pub max_per_series: u16,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            max_per_series: 10_000,
        }
    }
}

impl From<&tessen_core::config::ExpansionConfig> for ExpandOptions {
    fn from(config: &tessen_core::config::ExpansionConfig) -> Self {
        Self {
            max_per_series: config.max_instances,
        }
    }
}

/// One concrete occurrence of a scheduled component.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// UID of the series this occurrence belongs to.
    pub uid: String,
    /// Absolute start of the occurrence.
    pub start: DateTime<Utc>,
    /// Absolute end of the occurrence; never before `start`.
    pub end: DateTime<Utc>,
    /// Recurrence identity within the series, when there is one.
    pub recurrence_id: Option<DateTime<Utc>>,
    /// Snapshot of the component backing this occurrence.
    pub component: Component,
}

/// Delivery bucket key. Owned series sort by UID; orphans always come last.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstanceKey {
    /// Instances generated for (or overriding) a specific UID.
    Owned(String),
    /// Overrides that matched no master in the input.
    Orphan,
}

/// Instances grouped per delivery bucket, in delivery order.
#[derive(Debug, Default)]
pub struct InstanceStore {
    buckets: BTreeMap<InstanceKey, Vec<Instance>>,
}

impl InstanceStore {
    fn extend(&mut self, key: InstanceKey, instances: Vec<Instance>) {
        if !instances.is_empty() {
            self.buckets.entry(key).or_default().extend(instances);
        }
    }

    /// Delivers every bucket to the sink, sorted by start within each
    /// bucket (stable on ties). Cancellation is polled once per bucket;
    /// a `false` from the sink halts all remaining delivery.
    pub fn deliver<S>(mut self, cancel: &AtomicBool, sink: &mut S)
    where
        S: FnMut(&Instance) -> bool,
    {
        for batch in self.buckets.values_mut() {
            if cancel.load(Ordering::Relaxed) {
                tracing::trace!("instance delivery cancelled");
                return;
            }
            batch.sort_by_key(|instance| instance.start);
            for instance in &**batch {
                if !sink(instance) {
                    return;
                }
            }
        }
    }
}

/// Expands `components` over the half-open window `[window.0, window.1)`,
/// pushing each instance to `sink`.
///
/// VTIMEZONE components in the slice define document zones; other TZIDs
/// resolve through `zone_lookup` and the system catalog. Malformed
/// components are skipped with a diagnostic. A `false` return from the
/// sink stops delivery entirely; `cancel` is polled between UID batches.
pub fn expand<F, S>(
    components: &[Component],
    window: (DateTime<Utc>, DateTime<Utc>),
    zone_lookup: F,
    options: &ExpandOptions,
    cancel: &AtomicBool,
    mut sink: S,
) where
    F: FnMut(&str) -> Result<Option<ZoneDefinition>, ZoneLookupError>,
    S: FnMut(&Instance) -> bool,
{
    let mut converter = ZoneConverter::new(zone_lookup);
    converter.register_document_zones(components);

    let mut store = InstanceStore::default();
    for (uid, series) in partition(components) {
        let mut instances = series
            .master
            .map(|master| expand_master(master, uid, window, options, &mut converter))
            .unwrap_or_default();

        let mut orphans = Vec::new();
        for component in series.overrides {
            merge_override(
                component,
                uid,
                window,
                &mut instances,
                &mut orphans,
                &mut converter,
            );
        }

        store.extend(InstanceKey::Owned(uid.to_string()), instances);
        store.extend(InstanceKey::Orphan, orphans);
    }

    store.deliver(cancel, &mut sink);
}

/// Bulk variant of [`expand`]: accumulates the full ordered instance list.
#[must_use]
pub fn expand_to_vec<F>(
    components: &[Component],
    window: (DateTime<Utc>, DateTime<Utc>),
    zone_lookup: F,
    options: &ExpandOptions,
) -> Vec<Instance>
where
    F: FnMut(&str) -> Result<Option<ZoneDefinition>, ZoneLookupError>,
{
    let cancel = AtomicBool::new(false);
    let mut collected = Vec::new();
    expand(components, window, zone_lookup, options, &cancel, |inst| {
        collected.push(inst.clone());
        true
    });
    collected
}

struct Series<'a> {
    master: Option<&'a Component>,
    overrides: Vec<&'a Component>,
}

/// Groups schedulable components by UID, splitting masters from overrides.
fn partition(components: &[Component]) -> BTreeMap<&str, Series<'_>> {
    let mut groups: BTreeMap<&str, Series<'_>> = BTreeMap::new();

    for component in components {
        if !component.kind.is_schedulable() {
            continue;
        }
        let Some(uid) = component.uid() else {
            tracing::warn!(kind = %component.kind, "skipping component without UID");
            continue;
        };

        let series = groups.entry(uid).or_insert(Series {
            master: None,
            overrides: Vec::new(),
        });
        if component.is_override() {
            series.overrides.push(component);
        } else if series.master.is_none() {
            series.master = Some(component);
        } else {
            tracing::warn!(uid = %uid, "duplicate master component, keeping the first");
        }
    }

    groups
}

/// Start instant plus whether the property was date-only.
fn component_start<F>(
    component: &Component,
    converter: &mut ZoneConverter<F>,
) -> Option<(DateTime<Utc>, bool)>
where
    F: FnMut(&str) -> Result<Option<ZoneDefinition>, ZoneLookupError>,
{
    let prop = component.get_property("DTSTART")?;
    property_instant(prop, converter)
}

/// Resolves a date or date-time property to a UTC instant. Date-only
/// values anchor at midnight UTC.
fn property_instant<F>(
    prop: &Property,
    converter: &mut ZoneConverter<F>,
) -> Option<(DateTime<Utc>, bool)>
where
    F: FnMut(&str) -> Result<Option<ZoneDefinition>, ZoneLookupError>,
{
    match &prop.value {
        Value::DateTime(dt) => match converter.to_utc(dt) {
            Ok(instant) => Some((instant, false)),
            Err(err) => {
                tracing::warn!(property = %prop.name, error = %err, "unresolvable date-time");
                None
            }
        },
        Value::Date(d) => {
            let dt = IcalDateTime::utc(d.year, d.month, d.day, 0, 0, 0);
            converter.to_utc(&dt).ok().map(|instant| (instant, true))
        }
        _ => {
            tracing::warn!(property = %prop.name, "property is not a date or date-time");
            None
        }
    }
}

/// Duration of a component: DTEND/DUE minus start, then DURATION, then the
/// default (one day for date-only starts, zero otherwise).
fn component_duration<F>(
    component: &Component,
    start: DateTime<Utc>,
    date_only: bool,
    converter: &mut ZoneConverter<F>,
) -> TimeDelta
where
    F: FnMut(&str) -> Result<Option<ZoneDefinition>, ZoneLookupError>,
{
    let end_prop = component
        .get_property("DTEND")
        .or_else(|| component.get_property("DUE"));
    if let Some(prop) = end_prop
        && let Some((end, _)) = property_instant(prop, converter)
    {
        return (end - start).max(TimeDelta::zero());
    }

    if let Some(duration) = component
        .get_property("DURATION")
        .and_then(Property::as_duration)
    {
        return duration.as_delta().max(TimeDelta::zero());
    }

    if date_only {
        TimeDelta::days(1)
    } else {
        TimeDelta::zero()
    }
}

/// Half-open window intersection; zero-length intervals at the window start
/// still count.
fn intersects(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    window: (DateTime<Utc>, DateTime<Utc>),
) -> bool {
    start < window.1 && (end > window.0 || (end == start && start >= window.0))
}

fn expand_master<F>(
    master: &Component,
    uid: &str,
    window: (DateTime<Utc>, DateTime<Utc>),
    options: &ExpandOptions,
    converter: &mut ZoneConverter<F>,
) -> Vec<Instance>
where
    F: FnMut(&str) -> Result<Option<ZoneDefinition>, ZoneLookupError>,
{
    let Some((start, date_only)) = component_start(master, converter) else {
        tracing::warn!(uid = %uid, "skipping master without usable DTSTART");
        return Vec::new();
    };
    let duration = component_duration(master, start, date_only, converter);

    if master.has_rrule() {
        expand_recurring(master, uid, start, duration, window, options, converter)
    } else {
        let end = start + duration;
        if intersects(start, end, window) {
            vec![Instance {
                uid: uid.to_string(),
                start,
                end,
                recurrence_id: Some(start),
                component: master.clone(),
            }]
        } else {
            Vec::new()
        }
    }
}

fn expand_recurring<F>(
    master: &Component,
    uid: &str,
    dtstart: DateTime<Utc>,
    duration: TimeDelta,
    window: (DateTime<Utc>, DateTime<Utc>),
    options: &ExpandOptions,
    converter: &mut ZoneConverter<F>,
) -> Vec<Instance>
where
    F: FnMut(&str) -> Result<Option<ZoneDefinition>, ZoneLookupError>,
{
    let Some(rule_text) = master.get_property("RRULE").map(|p| p.raw_value.clone()) else {
        return Vec::new();
    };

    let rule = match rule_text.parse::<RRule<Unvalidated>>() {
        Ok(rule) => rule,
        Err(err) => {
            tracing::warn!(uid = %uid, error = %err, "skipping master with invalid RRULE");
            return Vec::new();
        }
    };

    let dtstart_rr = dtstart.with_timezone(&rrule::Tz::UTC);
    let mut rule_set = match rule.build(dtstart_rr) {
        Ok(set) => set,
        Err(err) => {
            tracing::warn!(uid = %uid, error = %err, "skipping master with unbuildable RRULE");
            return Vec::new();
        }
    };

    let rdates = datetime_list(master, "RDATE", converter);
    if !rdates.is_empty() {
        rule_set = rule_set.set_rdates(
            rdates
                .iter()
                .map(|dt| dt.with_timezone(&rrule::Tz::UTC))
                .collect(),
        );
    }
    let exdates = datetime_list(master, "EXDATE", converter);
    if !exdates.is_empty() {
        rule_set = rule_set.set_exdates(
            exdates
                .iter()
                .map(|dt| dt.with_timezone(&rrule::Tz::UTC))
                .collect(),
        );
    }

    // Widen the lower bound so occurrences straddling the window start are
    // still generated.
    let lower = (window.0 - duration).with_timezone(&rrule::Tz::UTC);
    let upper = window.1.with_timezone(&rrule::Tz::UTC);
    let result = rule_set.after(lower).before(upper).all(options.max_per_series);
    if result.limited {
        tracing::warn!(uid = %uid, limit = options.max_per_series, "series truncated at instance cap");
    }

    result
        .dates
        .into_iter()
        .map(|occ| occ.with_timezone(&Utc))
        .filter(|occ| intersects(*occ, *occ + duration, window))
        .map(|occ| {
            let end = occ + duration;
            Instance {
                uid: uid.to_string(),
                start: occ,
                end,
                recurrence_id: Some(occ),
                component: occurrence_component(master, occ, end),
            }
        })
        .collect()
}

/// Snapshot of the master for one occurrence: recurrence properties are
/// stripped, bounds rewritten to the occurrence, and a RECURRENCE-ID in UTC
/// identifies it within the series.
fn occurrence_component(master: &Component, start: DateTime<Utc>, end: DateTime<Utc>) -> Component {
    let mut snapshot = master.clone();
    snapshot.remove_properties("RRULE");
    snapshot.remove_properties("RDATE");
    snapshot.remove_properties("EXDATE");
    snapshot.set_property(Property::datetime("DTSTART", IcalDateTime::from_utc(start)));
    snapshot.set_property(Property::datetime("DTEND", IcalDateTime::from_utc(end)));
    snapshot.set_property(Property::datetime(
        "RECURRENCE-ID",
        IcalDateTime::from_utc(start),
    ));
    snapshot
}

fn datetime_list<F>(
    component: &Component,
    name: &str,
    converter: &mut ZoneConverter<F>,
) -> Vec<DateTime<Utc>>
where
    F: FnMut(&str) -> Result<Option<ZoneDefinition>, ZoneLookupError>,
{
    component
        .get_properties(name)
        .into_iter()
        .filter_map(|prop| property_instant(prop, converter).map(|(instant, _)| instant))
        .collect()
}

/// RANGE parameter semantics for a detached override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverrideRange {
    Single,
    ThisAndPrior,
    ThisAndFuture,
}

fn override_range(prop: &Property) -> OverrideRange {
    match prop
        .get_param_value("RANGE")
        .map(str::to_ascii_uppercase)
        .as_deref()
    {
        Some("THISANDPRIOR") => OverrideRange::ThisAndPrior,
        Some("THISANDFUTURE") => OverrideRange::ThisAndFuture,
        _ => OverrideRange::Single,
    }
}

/// Merges one detached override into the generated instances for its UID.
fn merge_override<F>(
    component: &Component,
    uid: &str,
    window: (DateTime<Utc>, DateTime<Utc>),
    instances: &mut Vec<Instance>,
    orphans: &mut Vec<Instance>,
    converter: &mut ZoneConverter<F>,
) where
    F: FnMut(&str) -> Result<Option<ZoneDefinition>, ZoneLookupError>,
{
    let Some(rid_prop) = component.get_property("RECURRENCE-ID") else {
        return;
    };
    let range = override_range(rid_prop);
    let Some((rid, _)) = property_instant(rid_prop, converter) else {
        tracing::warn!(uid = %uid, "skipping override with unresolvable RECURRENCE-ID");
        return;
    };

    let Some((start, date_only)) = component_start(component, converter) else {
        tracing::warn!(uid = %uid, "skipping override without usable DTSTART");
        return;
    };
    let end = start + component_duration(component, start, date_only, converter);

    let in_window = intersects(start, end, window);
    let rid_in_window = rid >= window.0 && rid < window.1;
    if !in_window && !rid_in_window {
        return;
    }

    match range {
        OverrideRange::Single => {
            let matched = instances
                .iter()
                .position(|instance| instance.recurrence_id == Some(rid));
            if let Some(pos) = matched {
                instances.remove(pos);
                if in_window {
                    instances.push(override_instance(component, uid, start, end, rid));
                }
            } else if in_window {
                orphans.push(override_instance(component, uid, start, end, rid));
            }
        }
        OverrideRange::ThisAndPrior | OverrideRange::ThisAndFuture => {
            let affects = |instance: &Instance| {
                instance.recurrence_id.is_some_and(|instance_rid| {
                    if range == OverrideRange::ThisAndPrior {
                        instance_rid <= rid
                    } else {
                        instance_rid >= rid
                    }
                })
            };

            let mut any = false;
            for instance in instances.iter_mut().filter(|i| affects(i)) {
                any = true;
                instance.recurrence_id = Some(rid);
                instance.component.set_property(Property::datetime(
                    "RECURRENCE-ID",
                    IcalDateTime::from_utc(rid),
                ));
            }

            if !any && in_window {
                orphans.push(override_instance(component, uid, start, end, rid));
            }
        }
    }
}

fn override_instance(
    component: &Component,
    uid: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    rid: DateTime<Utc>,
) -> Instance {
    Instance {
        uid: uid.to_string(),
        start,
        end,
        recurrence_id: Some(rid),
        component: component.clone(),
    }
}
