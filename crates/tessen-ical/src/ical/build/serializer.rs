//! Canonical iCalendar serializer (RFC 5545).

use super::escape::{escape_param_value, escape_text};
use super::fold::fold_line;
use crate::ical::core::{CalendarDocument, Component, ComponentKind, Parameter, Property, Value};

/// Serializes a calendar document to iCalendar text.
#[must_use]
pub fn serialize(doc: &CalendarDocument) -> String {
    serialize_component(&doc.root)
}

/// Serializes a single component, recursing into its children.
#[must_use]
pub fn serialize_component(component: &Component) -> String {
    let mut out = String::new();

    out.push_str(&fold_line(&format!("BEGIN:{}", component.name)));

    for prop in canonical_property_order(&component.properties, component.kind) {
        out.push_str(&serialize_property(prop));
    }

    for child in canonical_component_order(&component.children) {
        out.push_str(&serialize_component(child));
    }

    out.push_str(&fold_line(&format!("END:{}", component.name)));

    out
}

/// Serializes one property as a folded content line.
#[must_use]
pub fn serialize_property(prop: &Property) -> String {
    let mut line = prop.name.clone();

    for param in canonical_param_order(&prop.params) {
        line.push(';');
        line.push_str(&serialize_parameter(param));
    }

    line.push(':');
    line.push_str(&serialize_value(&prop.value, &prop.raw_value));

    fold_line(&line)
}

fn serialize_parameter(param: &Parameter) -> String {
    let values: Vec<String> = param
        .values
        .iter()
        .map(|v| escape_param_value(v))
        .collect();
    format!("{}={}", param.name, values.join(","))
}

/// Text values are escaped; everything else round-trips through the raw
/// value string.
fn serialize_value(value: &Value, raw_value: &str) -> String {
    match value {
        Value::Text(s) => escape_text(s),
        Value::Date(_) | Value::DateTime(_) | Value::Duration(_) | Value::Unknown(_) => {
            raw_value.to_string()
        }
    }
}

/// Fixed property order per component kind. Properties outside the table
/// keep their original relative order after the ordered ones.
fn canonical_property_order(props: &[Property], kind: ComponentKind) -> Vec<&Property> {
    let order: &[&str] = match kind {
        ComponentKind::Calendar => &["VERSION", "PRODID", "CALSCALE", "METHOD"],
        ComponentKind::Event | ComponentKind::Todo | ComponentKind::Journal => &[
            "UID",
            "DTSTAMP",
            "DTSTART",
            "DTEND",
            "DUE",
            "DURATION",
            "RRULE",
            "RDATE",
            "EXDATE",
            "RECURRENCE-ID",
            "SUMMARY",
            "DESCRIPTION",
            "LOCATION",
            "STATUS",
            "TRANSP",
            "ORGANIZER",
            "ATTENDEE",
            "CATEGORIES",
            "CREATED",
            "LAST-MODIFIED",
            "SEQUENCE",
        ],
        ComponentKind::Timezone => &["TZID", "LAST-MODIFIED", "TZURL"],
        ComponentKind::Standard | ComponentKind::Daylight => &[
            "DTSTART",
            "TZOFFSETFROM",
            "TZOFFSETTO",
            "RRULE",
            "RDATE",
            "TZNAME",
        ],
        ComponentKind::Alarm => &["ACTION", "TRIGGER", "DESCRIPTION", "DURATION", "REPEAT"],
        ComponentKind::Unknown => &[],
    };

    let mut ordered: Vec<&Property> = Vec::with_capacity(props.len());

    for &name in order {
        ordered.extend(props.iter().filter(|p| p.name.eq_ignore_ascii_case(name)));
    }
    ordered.extend(
        props
            .iter()
            .filter(|p| !order.iter().any(|&n| p.name.eq_ignore_ascii_case(n))),
    );

    ordered
}

fn canonical_param_order(params: &[Parameter]) -> Vec<&Parameter> {
    let order = ["VALUE", "TZID", "LANGUAGE", "CN", "ROLE", "PARTSTAT", "RANGE"];

    let mut ordered: Vec<&Parameter> = Vec::with_capacity(params.len());

    for name in &order {
        ordered.extend(params.iter().filter(|p| p.name.eq_ignore_ascii_case(name)));
    }
    ordered.extend(
        params
            .iter()
            .filter(|p| !order.iter().any(|n| p.name.eq_ignore_ascii_case(n))),
    );

    ordered
}

/// Fixed child order: timezones first, then scheduled components sorted by
/// UID and RECURRENCE-ID, then timezone observances, alarms, and the rest.
fn canonical_component_order(children: &[Component]) -> Vec<&Component> {
    let mut timezones: Vec<&Component> = Vec::new();
    let mut scheduled: Vec<&Component> = Vec::new();
    let mut observances: Vec<&Component> = Vec::new();
    let mut alarms: Vec<&Component> = Vec::new();
    let mut other: Vec<&Component> = Vec::new();

    for child in children {
        match child.kind {
            ComponentKind::Timezone => timezones.push(child),
            ComponentKind::Event | ComponentKind::Todo | ComponentKind::Journal => {
                scheduled.push(child);
            }
            ComponentKind::Standard | ComponentKind::Daylight => observances.push(child),
            ComponentKind::Alarm => alarms.push(child),
            ComponentKind::Calendar | ComponentKind::Unknown => other.push(child),
        }
    }

    scheduled.sort_by(|a, b| cmp_by_uid_recurrence(a, b));

    let mut result = Vec::with_capacity(children.len());
    result.extend(timezones);
    result.extend(scheduled);
    result.extend(observances);
    result.extend(alarms);
    result.extend(other);
    result
}

fn cmp_by_uid_recurrence(a: &Component, b: &Component) -> std::cmp::Ordering {
    let uid_a = a.uid().unwrap_or("");
    let uid_b = b.uid().unwrap_or("");

    uid_a.cmp(uid_b).then_with(|| {
        let rid_a = a
            .get_property("RECURRENCE-ID")
            .map_or("", |p| p.raw_value.as_str());
        let rid_b = b
            .get_property("RECURRENCE-ID")
            .map_or("", |p| p.raw_value.as_str());
        rid_a.cmp(rid_b)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ical::core::DateTime;

    #[test]
    fn serialize_simple_event() {
        let mut doc = CalendarDocument::new("-//Test//Test//EN");
        let mut event = Component::event();
        event.add_property(Property::text("UID", "test-uid-123"));
        event.add_property(Property::text("SUMMARY", "Test Event"));
        doc.add_component(event);

        let output = serialize(&doc);

        assert!(output.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(output.ends_with("END:VCALENDAR\r\n"));
        assert!(output.contains("VERSION:2.0\r\n"));
        assert!(output.contains("UID:test-uid-123\r\n"));
        assert!(output.contains("SUMMARY:Test Event\r\n"));
    }

    #[test]
    fn serialize_escapes_text_values() {
        let mut event = Component::event();
        event.add_property(Property::text("SUMMARY", "Meeting, important"));
        event.add_property(Property::text("DESCRIPTION", "Line 1\nLine 2"));

        let output = serialize_component(&event);

        assert!(output.contains("SUMMARY:Meeting\\, important\r\n"));
        assert!(output.contains("DESCRIPTION:Line 1\\nLine 2\r\n"));
    }

    #[test]
    fn serialize_canonical_property_order() {
        let mut event = Component::event();
        event.add_property(Property::text("SUMMARY", "Summary"));
        event.add_property(Property::text("UID", "uid"));

        let output = serialize_component(&event);

        let uid_pos = output.find("UID:").unwrap();
        let summary_pos = output.find("SUMMARY:").unwrap();
        assert!(uid_pos < summary_pos);
    }

    #[test]
    fn serialize_is_deterministic_across_insertion_order() {
        let mut a = Component::timezone();
        a.add_property(Property::text("TZID", "Custom/Zone"));
        let mut obs_a = Component::new(ComponentKind::Standard);
        obs_a.add_property(Property::text("TZOFFSETTO", "-0700"));
        obs_a.add_property(Property::text("TZOFFSETFROM", "-0600"));
        obs_a.add_property(Property::datetime(
            "DTSTART",
            DateTime::floating(1970, 11, 1, 2, 0, 0),
        ));
        a.add_child(obs_a);

        let mut b = Component::timezone();
        let mut obs_b = Component::new(ComponentKind::Standard);
        obs_b.add_property(Property::datetime(
            "DTSTART",
            DateTime::floating(1970, 11, 1, 2, 0, 0),
        ));
        obs_b.add_property(Property::text("TZOFFSETFROM", "-0600"));
        obs_b.add_property(Property::text("TZOFFSETTO", "-0700"));
        b.add_child(obs_b);
        b.add_property(Property::text("TZID", "Custom/Zone"));

        assert_eq!(serialize_component(&a), serialize_component(&b));
    }

    #[test]
    fn serialize_zoned_datetime_with_tzid_param() {
        let mut event = Component::event();
        event.add_property(Property::datetime(
            "DTSTART",
            DateTime::zoned(2026, 1, 23, 12, 0, 0, "America/New_York"),
        ));

        let output = serialize_component(&event);
        assert!(output.contains("DTSTART;TZID=America/New_York:20260123T120000\r\n"));
    }
}
