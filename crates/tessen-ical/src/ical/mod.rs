//! iCalendar model, serialization, and expansion.

pub mod build;
pub mod core;
pub mod expand;
