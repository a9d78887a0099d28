//! Console Bridge Library
//!
//! Command-line front end for the console session bridge. The session logic
//! lives in the workspace crates; this crate only wires them to stdin/stdout.

pub mod headless;

// Re-export main entry point
pub use headless::runner::{is_configuration_error, run_headless};
