//! Shared foundation for the tessen workspace: error kinds, runtime
//! configuration, and constants used across crates.

pub mod config;
pub mod constants;
pub mod error;
