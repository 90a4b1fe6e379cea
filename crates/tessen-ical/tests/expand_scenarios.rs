//! End-to-end scenarios across reconciliation, serialization, and
//! expansion: a document is reconciled against the system zone catalog
//! first, then its scheduled components are expanded over a window.

use chrono::{DateTime, TimeZone, Utc};

use tessen_ical::ical::build::serialize;
use tessen_ical::ical::core::{
    CalendarDocument, Component, ComponentKind, DateTime as IcalDateTime, Property,
};
use tessen_ical::ical::expand::{
    ExpandOptions, ZoneDefinition, expand_to_vec, reconcile, system_zone_lookup,
};

fn fixed_zone(tzid: &str, offset: &str) -> Component {
    let mut timezone = Component::timezone();
    timezone.add_property(Property::text("TZID", tzid));

    let mut standard = Component::new(ComponentKind::Standard);
    standard.add_property(Property::datetime(
        "DTSTART",
        IcalDateTime::floating(1970, 1, 1, 0, 0, 0),
    ));
    standard.add_property(Property::text("TZOFFSETFROM", offset));
    standard.add_property(Property::text("TZOFFSETTO", offset));
    timezone.add_child(standard);
    timezone
}

fn daily_event(uid: &str, dtstart: IcalDateTime) -> Component {
    let mut event = Component::event();
    event.add_property(Property::text("UID", uid));
    event.add_property(Property::datetime("DTSTART", dtstart));
    event.add_property(Property::text("RRULE", "FREQ=DAILY"));
    event
}

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn expand_document(
    document: &CalendarDocument,
    window: (DateTime<Utc>, DateTime<Utc>),
) -> Vec<tessen_ical::ical::expand::Instance> {
    expand_to_vec(
        &document.root.children,
        window,
        system_zone_lookup,
        &ExpandOptions::default(),
    )
}

/// An aliased system zone is replaced by the builtin definition, every
/// reference is rewritten, and expansion resolves the rewritten zone to
/// the correct UTC instants.
#[test_log::test]
fn aliased_zone_reconciles_and_expands() {
    let mut document = CalendarDocument::default();
    document.add_timezone(fixed_zone("US/Eastern", "-0500"));
    document.add_component(daily_event(
        "morning-standup",
        IcalDateTime::zoned(2026, 1, 5, 9, 0, 0, "US/Eastern"),
    ));

    reconcile(&mut document, &mut [], system_zone_lookup).expect("reconcile succeeds");

    let timezones = document.timezones();
    assert_eq!(timezones.len(), 1);
    assert_eq!(timezones[0].tzid(), Some("America/New_York"));

    let event = document.scheduled()[0];
    assert_eq!(
        event.get_property("DTSTART").unwrap().tzid(),
        Some("America/New_York")
    );

    let window = (utc(2026, 1, 5, 0, 0), utc(2026, 1, 8, 0, 0));
    let instances = expand_document(&document, window);
    assert_eq!(instances.len(), 3);
    // 09:00 Eastern standard time is 14:00 UTC.
    assert_eq!(instances[0].start, utc(2026, 1, 5, 14, 0));
}

/// A custom zone renamed during reconciliation still resolves: the
/// VTIMEZONE block and every reference move to the new name together.
#[test_log::test]
fn renamed_custom_zone_still_resolves() {
    let mut document = CalendarDocument::default();
    document.add_timezone(fixed_zone("Office/Fixed", "+0230"));
    document.add_component(daily_event(
        "shift",
        IcalDateTime::zoned(2026, 1, 5, 9, 0, 0, "Office/Fixed"),
    ));

    // A different definition already owns the bare name.
    let lookup = |tzid: &str| {
        if tzid == "Office/Fixed" {
            Ok(Some(ZoneDefinition::new(
                tzid,
                fixed_zone("Office/Fixed", "+0300"),
            )))
        } else {
            Ok(None)
        }
    };
    reconcile(&mut document, &mut [], lookup).expect("reconcile succeeds");

    assert_eq!(document.timezones()[0].tzid(), Some("Office/Fixed 1"));
    let event = document.scheduled()[0];
    assert_eq!(
        event.get_property("DTSTART").unwrap().tzid(),
        Some("Office/Fixed 1")
    );

    let window = (utc(2026, 1, 5, 0, 0), utc(2026, 1, 6, 0, 0));
    let instances = expand_document(&document, window);
    assert_eq!(instances.len(), 1);
    // 09:00 at +02:30 is 06:30 UTC.
    assert_eq!(instances[0].start, utc(2026, 1, 5, 6, 30));
}

/// Owned series deliver in UID order and every orphaned override comes
/// after all of them, regardless of lexicographic position.
#[test_log::test]
fn delivery_order_groups_series_and_defers_orphans() {
    let mut document = CalendarDocument::default();
    document.add_component(daily_event(
        "beta",
        IcalDateTime::utc(2026, 1, 5, 9, 0, 0),
    ));
    document.add_component(daily_event(
        "alpha",
        IcalDateTime::utc(2026, 1, 5, 12, 0, 0),
    ));

    let mut orphan = Component::event();
    orphan.add_property(Property::text("UID", "aardvark-orphan"));
    orphan.add_property(Property::datetime(
        "RECURRENCE-ID",
        IcalDateTime::utc(2026, 1, 6, 9, 0, 0),
    ));
    orphan.add_property(Property::datetime(
        "DTSTART",
        IcalDateTime::utc(2026, 1, 6, 9, 0, 0),
    ));
    document.add_component(orphan);

    let window = (utc(2026, 1, 5, 0, 0), utc(2026, 1, 8, 0, 0));
    let instances = expand_document(&document, window);
    assert_eq!(instances.len(), 7);

    let uids: Vec<&str> = instances.iter().map(|i| i.uid.as_str()).collect();
    assert_eq!(
        uids,
        ["alpha", "alpha", "alpha", "beta", "beta", "beta", "aardvark-orphan"]
    );
}

/// Reconciling an already reconciled document changes nothing, down to
/// the serialized bytes.
#[test_log::test]
fn reconcile_is_stable_at_the_text_level() {
    let mut document = CalendarDocument::default();
    document.add_timezone(fixed_zone("US/Eastern", "-0500"));
    document.add_timezone(fixed_zone("Office/Fixed", "+0230"));
    document.add_component(daily_event(
        "e1",
        IcalDateTime::zoned(2026, 1, 5, 9, 0, 0, "US/Eastern"),
    ));
    document.add_component(daily_event(
        "e2",
        IcalDateTime::zoned(2026, 1, 5, 9, 0, 0, "Office/Fixed"),
    ));

    reconcile(&mut document, &mut [], system_zone_lookup).expect("first pass");
    let first = serialize(&document);
    reconcile(&mut document, &mut [], system_zone_lookup).expect("second pass");
    let second = serialize(&document);

    assert_eq!(first, second);
}

/// A detached override rewrites exactly one generated instance; the rest
/// of the series is untouched.
#[test_log::test]
fn detached_override_replaces_one_instance() {
    let mut document = CalendarDocument::default();
    document.add_component(daily_event(
        "series",
        IcalDateTime::utc(2026, 1, 5, 9, 0, 0),
    ));

    let mut moved = Component::event();
    moved.add_property(Property::text("UID", "series"));
    moved.add_property(Property::datetime(
        "RECURRENCE-ID",
        IcalDateTime::utc(2026, 1, 6, 9, 0, 0),
    ));
    moved.add_property(Property::datetime(
        "DTSTART",
        IcalDateTime::utc(2026, 1, 6, 15, 0, 0),
    ));
    document.add_component(moved);

    let window = (utc(2026, 1, 5, 0, 0), utc(2026, 1, 8, 0, 0));
    let instances = expand_document(&document, window);
    assert_eq!(instances.len(), 3);

    let starts: Vec<DateTime<Utc>> = instances.iter().map(|i| i.start).collect();
    assert_eq!(
        starts,
        [
            utc(2026, 1, 5, 9, 0),
            utc(2026, 1, 6, 15, 0),
            utc(2026, 1, 7, 9, 0),
        ]
    );
    assert_eq!(instances[1].recurrence_id, Some(utc(2026, 1, 6, 9, 0)));
}

/// The per-series cap truncates an unbounded rule instead of running
/// away.
#[test_log::test]
fn instance_cap_bounds_unbounded_rules() {
    let mut document = CalendarDocument::default();
    document.add_component(daily_event(
        "forever",
        IcalDateTime::utc(2026, 1, 1, 9, 0, 0),
    ));

    let window = (utc(2026, 1, 1, 0, 0), utc(2027, 1, 1, 0, 0));
    let instances = expand_to_vec(
        &document.root.children,
        window,
        system_zone_lookup,
        &ExpandOptions { max_per_series: 5 },
    );
    assert_eq!(instances.len(), 5);
}
