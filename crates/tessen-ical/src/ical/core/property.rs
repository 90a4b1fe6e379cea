//! iCalendar property types (RFC 5545 §3.1, §3.8).

use super::{Date, DateTime, DateTimeForm, Duration, Parameter};

/// Value types (RFC 5545 §3.3).
///
/// The parsed value of a property. The raw string is preserved separately
/// for round-trip fidelity.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// DATE value.
    Date(Date),
    /// DATE-TIME value.
    DateTime(DateTime),
    /// DURATION value.
    Duration(Duration),
    /// TEXT value (unescaped).
    Text(String),
    /// Unknown or unparsed value. Preserved for round-trip.
    Unknown(String),
}

impl Value {
    /// Returns this value as text, if it is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns this value as a date-time, if it is a date-time value.
    #[must_use]
    pub fn as_datetime(&self) -> Option<&DateTime> {
        match self {
            Self::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Returns this value as a date, if it is a date value.
    #[must_use]
    pub fn as_date(&self) -> Option<&Date> {
        match self {
            Self::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Returns this value as a duration, if it is a duration value.
    #[must_use]
    pub fn as_duration(&self) -> Option<&Duration> {
        match self {
            Self::Duration(d) => Some(d),
            _ => None,
        }
    }
}

/// A fully parsed iCalendar property.
///
/// Contains the parsed value along with the original raw value
/// for round-trip fidelity.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Property name (normalized to uppercase).
    pub name: String,
    /// Parameters in order of appearance.
    pub params: Vec<Parameter>,
    /// Parsed value.
    pub value: Value,
    /// Original raw value string (for round-trip).
    pub raw_value: String,
}

impl Property {
    /// Creates a property with a text value.
    #[must_use]
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        let value_str = value.into();
        Self {
            name: name.into().to_ascii_uppercase(),
            params: Vec::new(),
            value: Value::Text(value_str.clone()),
            raw_value: value_str,
        }
    }

    /// Creates a property with a datetime value.
    ///
    /// Zoned datetimes get a matching TZID parameter so that the parameter
    /// view and the value form never disagree.
    #[must_use]
    pub fn datetime(name: impl Into<String>, dt: DateTime) -> Self {
        let raw = dt.to_string();
        let params = match &dt.form {
            DateTimeForm::Zoned { tzid } => vec![Parameter::tzid(tzid.clone())],
            _ => Vec::new(),
        };
        Self {
            name: name.into().to_ascii_uppercase(),
            params,
            value: Value::DateTime(dt),
            raw_value: raw,
        }
    }

    /// Creates a property with a date value.
    #[must_use]
    pub fn date(name: impl Into<String>, d: Date) -> Self {
        let raw = d.to_string();
        Self {
            name: name.into().to_ascii_uppercase(),
            params: vec![Parameter::value_type("DATE")],
            value: Value::Date(d),
            raw_value: raw,
        }
    }

    /// Creates a property with a duration value.
    #[must_use]
    pub fn duration(name: impl Into<String>, d: Duration) -> Self {
        let raw = d.to_string();
        Self {
            name: name.into().to_ascii_uppercase(),
            params: Vec::new(),
            value: Value::Duration(d),
            raw_value: raw,
        }
    }

    /// Returns the parameter with the given name.
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<&Parameter> {
        let name_upper = name.to_ascii_uppercase();
        self.params.iter().find(|p| p.name == name_upper)
    }

    /// Returns the value of a parameter.
    #[must_use]
    pub fn get_param_value(&self, name: &str) -> Option<&str> {
        let p = self.get_param(name)?;
        p.value()
    }

    /// Adds a parameter to this property.
    pub fn add_param(&mut self, param: Parameter) {
        self.params.push(param);
    }

    /// Sets a parameter, replacing any existing parameter with the same name.
    pub fn set_param(&mut self, param: Parameter) {
        self.params.retain(|p| p.name != param.name);
        self.params.push(param);
    }

    /// Returns the value as text if it is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        self.value.as_text()
    }

    /// Returns the value as a datetime if it is a datetime value.
    #[must_use]
    pub fn as_datetime(&self) -> Option<&DateTime> {
        self.value.as_datetime()
    }

    /// Returns the value as a date if it is a date value.
    #[must_use]
    pub fn as_date(&self) -> Option<&Date> {
        self.value.as_date()
    }

    /// Returns the value as a duration if it is a duration value.
    #[must_use]
    pub fn as_duration(&self) -> Option<&Duration> {
        self.value.as_duration()
    }

    /// Returns the TZID parameter if present, falling back to the TZID
    /// carried by a zoned datetime value.
    #[must_use]
    pub fn tzid(&self) -> Option<&str> {
        self.get_param_value("TZID")
            .or_else(|| self.as_datetime().and_then(DateTime::tzid))
    }
}
