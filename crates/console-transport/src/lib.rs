//! # console-transport - Protocol Library and Tunnel Transport
//!
//! Everything the console bridge needs to reach a VM console: loading the
//! protocol-client library, waiting for the display surface, building the
//! proxy WebSocket URL, and the built-in WebSocket tunnel session.
//!
//! Depends on [`console_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Library Loading
//! - [`LibraryRegistry`] - Process-wide binding point for the library's session factory
//! - [`ProtocolLibraryLoader`] - Idempotent, single-flight loader with forced reload
//! - [`TunnelLibrary`] - Registry for the built-in tunnel library
//!
//! ### Display Surface
//! - [`SurfaceProbe`] - Looks up the render target
//! - [`SurfaceSlot`] - Shared slot a front end mounts its render target into
//! - [`DisplaySurfaceGate`] - Bounded polling until the render target exists
//!
//! ### Protocol Session Contract
//! - [`SessionFactory`], [`ProtocolSession`] - Constructor and live session
//! - [`SessionListener`], [`ProtocolEvent`] - Lifecycle event delivery
//! - [`SessionOptions`], [`RenderTarget`], [`ConsoleInput`] - Construction inputs
//!
//! ### Endpoint
//! - [`PageOrigin`] - Origin of the page hosting the console
//! - [`build_transport_url()`] - Proxy WebSocket URL for a target console

pub mod endpoint;
pub mod library;
pub mod session;
pub mod surface;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod tunnel;

// Public API re-exports
pub use endpoint::{build_transport_url, PageOrigin, DEFAULT_PROXY_PATH};
pub use library::{
    LibraryRegistry, ProtocolLibraryLoader, TunnelLibrary, DEFAULT_LOAD_TIMEOUT,
};
pub use session::{
    ConsoleInput, ProtocolEvent, ProtocolSession, RenderTarget, SessionFactory, SessionListener,
    SessionOptions,
};
pub use surface::{
    DisplaySurfaceGate, SurfaceProbe, SurfaceSlot, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL,
};
pub use tunnel::{TunnelSession, TunnelSessionFactory};
