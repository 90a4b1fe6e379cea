//! Recurrence expansion and timezone canonicalization.
//!
//! Three cooperating pieces live here:
//!
//! - [`timezone`] resolves free-form TZID strings against the system zone
//!   catalog and converts zone-qualified wall times to UTC instants.
//! - [`reconcile`] rewrites a calendar document so every VTIMEZONE either
//!   matches a catalog zone (and is replaced by the builtin definition) or
//!   keeps a collision-free custom identifier, patching all references.
//! - [`expander`] turns recurring components plus their detached overrides
//!   into a window-bounded, ordered list of concrete instances.

pub mod catalog;
pub mod expander;
pub mod reconcile;
pub mod timezone;
pub mod vtimezone;

pub use catalog::{ZoneDefinition, ZoneLookupError, system_zone_lookup};
pub use expander::{ExpandOptions, Instance, InstanceKey, InstanceStore, expand, expand_to_vec};
pub use reconcile::{ReconcileError, reconcile};
pub use timezone::{ConversionError, ZoneConverter, match_tzid};
pub use vtimezone::{Observance, ObservanceKind, UtcOffset, VTimezone, VTimezoneError};
