//! iCalendar core models (RFC 5545).
//!
//! The types here carry calendar content in memory. They preserve unknown
//! properties and parameters, and serialize deterministically so that two
//! semantically identical timezone definitions compare byte-equal.

mod component;
mod datetime;
mod duration;
mod parameter;
mod property;

pub use component::{CalendarDocument, Component, ComponentKind};
pub use datetime::{Date, DateTime, DateTimeForm};
pub use duration::Duration;
pub use parameter::Parameter;
pub use property::{Property, Value};
