//! Calendar-object model, timezone reconciliation, and recurrence
//! expansion.
//!
//! The crate is organized around three layers:
//! - [`ical::core`] — the in-memory component/property model (RFC 5545).
//! - [`ical::build`] — canonical serialization, used for zone-definition
//!   equality.
//! - [`ical::expand`] — timezone matching against the system catalog,
//!   document-wide TZID reconciliation, and window-bounded expansion of
//!   recurring components into concrete instances.

pub mod ical;
