//! Utility functions shared across nixnav.
//!
//! ## Modules
//!
//! - [`app_data`] - Configuration file and bookmark management (XDG-compliant)
//! - [`mounts`] - Network filesystem detection for bookmark roots
//! - [`logging`] - tracing subscriber setup
//! - [`progress`] - Spinner for long-running service calls

pub mod app_data;
pub mod logging;
pub mod mounts;
pub mod progress;

pub use app_data::*;
pub use logging::*;
pub use mounts::*;
