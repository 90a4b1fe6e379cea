//! iCalendar text output (RFC 5545 §3.1).
//!
//! Serialization is canonical: properties, parameters, and child components
//! are emitted in a fixed order, so two structurally equal components always
//! serialize to identical bytes. Timezone reconciliation relies on this when
//! comparing zone definitions.

mod escape;
mod fold;
mod serializer;

pub use escape::{escape_param_value, escape_text};
pub use fold::fold_line;
pub use serializer::{serialize, serialize_component, serialize_property};
