//! iCalendar component types (RFC 5545 §3.4-3.6).

use super::{DateTimeForm, Property, Value};

/// Component kind for iCalendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// VCALENDAR wrapper component.
    Calendar,
    /// VEVENT component.
    Event,
    /// VTODO component.
    Todo,
    /// VJOURNAL component.
    Journal,
    /// VTIMEZONE component.
    Timezone,
    /// VALARM component (nested within VEVENT/VTODO).
    Alarm,
    /// STANDARD sub-component of VTIMEZONE.
    Standard,
    /// DAYLIGHT sub-component of VTIMEZONE.
    Daylight,
    /// Unknown/X-component.
    Unknown,
}

impl ComponentKind {
    /// Returns the string name for this component kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Calendar => "VCALENDAR",
            Self::Event => "VEVENT",
            Self::Todo => "VTODO",
            Self::Journal => "VJOURNAL",
            Self::Timezone => "VTIMEZONE",
            Self::Alarm => "VALARM",
            Self::Standard => "STANDARD",
            Self::Daylight => "DAYLIGHT",
            Self::Unknown => "X-UNKNOWN",
        }
    }

    /// Returns whether this is a schedulable component (VEVENT, VTODO, VJOURNAL).
    #[must_use]
    pub const fn is_schedulable(self) -> bool {
        matches!(self, Self::Event | Self::Todo | Self::Journal)
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An iCalendar component.
///
/// Components contain properties and nested sub-components. For example, a
/// VCALENDAR contains VEVENTs, which may contain VALARMs.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Component type/name.
    pub kind: ComponentKind,
    /// Original component name (preserved for X-components).
    pub name: String,
    /// Properties in order of appearance.
    pub properties: Vec<Property>,
    /// Nested sub-components.
    pub children: Vec<Component>,
}

impl Component {
    /// Creates a new component with the given kind.
    #[must_use]
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            name: kind.as_str().to_string(),
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Creates a VEVENT component.
    #[must_use]
    pub fn event() -> Self {
        Self::new(ComponentKind::Event)
    }

    /// Creates a VTIMEZONE component.
    #[must_use]
    pub fn timezone() -> Self {
        Self::new(ComponentKind::Timezone)
    }

    /// Adds a property to this component.
    pub fn add_property(&mut self, prop: Property) {
        self.properties.push(prop);
    }

    /// Sets a property, replacing every existing property with the same name.
    pub fn set_property(&mut self, prop: Property) {
        self.properties.retain(|p| p.name != prop.name);
        self.properties.push(prop);
    }

    /// Removes all properties with the given name.
    pub fn remove_properties(&mut self, name: &str) {
        let name_upper = name.to_ascii_uppercase();
        self.properties.retain(|p| p.name != name_upper);
    }

    /// Adds a child component.
    pub fn add_child(&mut self, child: Component) {
        self.children.push(child);
    }

    /// Returns the first property with the given name.
    #[must_use]
    pub fn get_property(&self, name: &str) -> Option<&Property> {
        let name_upper = name.to_ascii_uppercase();
        self.properties.iter().find(|p| p.name == name_upper)
    }

    /// Returns a mutable reference to the first property with the given name.
    #[must_use]
    pub fn get_property_mut(&mut self, name: &str) -> Option<&mut Property> {
        let name_upper = name.to_ascii_uppercase();
        self.properties.iter_mut().find(|p| p.name == name_upper)
    }

    /// Returns all properties with the given name.
    #[must_use]
    pub fn get_properties(&self, name: &str) -> Vec<&Property> {
        let name_upper = name.to_ascii_uppercase();
        self.properties
            .iter()
            .filter(|p| p.name == name_upper)
            .collect()
    }

    /// Returns the UID property value if present.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.get_property("UID")?.as_text()
    }

    /// Returns the TZID property value if present (VTIMEZONE components).
    #[must_use]
    pub fn tzid(&self) -> Option<&str> {
        self.get_property("TZID")?.as_text()
    }

    /// Returns whether this component carries a recurrence rule.
    #[must_use]
    pub fn has_rrule(&self) -> bool {
        self.get_property("RRULE").is_some()
    }

    /// Returns whether this component is a detached override, i.e. carries
    /// a RECURRENCE-ID.
    #[must_use]
    pub fn is_override(&self) -> bool {
        self.get_property("RECURRENCE-ID").is_some()
    }

    /// Returns children of a specific kind.
    #[must_use]
    pub fn children_of_kind(&self, kind: ComponentKind) -> Vec<&Component> {
        self.children.iter().filter(|c| c.kind == kind).collect()
    }

    /// Rewrites every TZID reference in this component's properties through
    /// `rename`, leaving references the closure declines untouched.
    ///
    /// Both the TZID parameter and the zone carried inside a zoned datetime
    /// value are rewritten, so the two views never disagree. VTIMEZONE
    /// components are left alone; their TZID property is an identity, not a
    /// reference.
    pub fn patch_tzid_references(&mut self, rename: &mut impl FnMut(&str) -> Option<String>) {
        if self.kind == ComponentKind::Timezone {
            return;
        }

        for prop in &mut self.properties {
            if let Some(param) = prop
                .params
                .iter_mut()
                .find(|p| p.name == "TZID")
                && let Some(old) = param.value()
                && let Some(new) = rename(old)
            {
                param.set_value(new.clone());
                if let Value::DateTime(dt) = &mut prop.value {
                    dt.form = DateTimeForm::Zoned { tzid: new };
                }
            }
        }

        for child in &mut self.children {
            child.patch_tzid_references(rename);
        }
    }
}

/// Top-level calendar document.
///
/// A convenience wrapper around a VCALENDAR component: an ordered list of
/// VTIMEZONE definitions followed by scheduled components, all sharing one
/// TZID namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarDocument {
    /// The root VCALENDAR component.
    pub root: Component,
}

impl CalendarDocument {
    /// Creates a new empty document with required calendar properties.
    #[must_use]
    pub fn new(prodid: impl Into<String>) -> Self {
        let mut root = Component::new(ComponentKind::Calendar);
        root.add_property(Property::text("VERSION", "2.0"));
        root.add_property(Property::text("PRODID", prodid));
        Self { root }
    }

    /// Adds a VTIMEZONE component.
    pub fn add_timezone(&mut self, tz: Component) {
        self.root.add_child(tz);
    }

    /// Adds a scheduled component (VEVENT, VTODO, VJOURNAL).
    pub fn add_component(&mut self, comp: Component) {
        self.root.add_child(comp);
    }

    /// Returns all VTIMEZONE components.
    #[must_use]
    pub fn timezones(&self) -> Vec<&Component> {
        self.root.children_of_kind(ComponentKind::Timezone)
    }

    /// Returns all scheduled components (everything except VTIMEZONE).
    #[must_use]
    pub fn scheduled(&self) -> Vec<&Component> {
        self.root
            .children
            .iter()
            .filter(|c| c.kind != ComponentKind::Timezone)
            .collect()
    }
}

impl Default for CalendarDocument {
    fn default() -> Self {
        Self::new(tessen_core::constants::PRODID)
    }
}
