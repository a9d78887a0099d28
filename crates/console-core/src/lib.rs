//! # console-core - Core Domain Types
//!
//! Foundation crate for the console session bridge. Provides the launch
//! parameter parser, session lifecycle types, error handling and logging.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing, url).
//!
//! ## Public API
//!
//! ### Launch Parameters (`params`)
//! - [`LaunchContext`] - Raw query parameters the console page was opened with
//! - [`SessionConfig`] - Validated, immutable host/port/credential/server id
//! - [`Credential`] - Opaque secret with a redacting `Debug`
//! - [`ConfigError`] - Missing or malformed launch parameter
//!
//! ### Lifecycle Types (`types`)
//! - [`Phase`] - Connection phase of a console session
//! - [`FailureKind`], [`Failure`] - Failure taxonomy shown to the operator
//! - [`RetryBudget`] - Bounded attempt counter
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! ```rust
//! use console_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod params;
pub mod prelude;
pub mod types;

pub use error::{Error, Result, ResultExt};
pub use params::{ConfigError, Credential, LaunchContext, LaunchField, SessionConfig};
pub use types::{Failure, FailureKind, Phase, RetryBudget};
