//! Render Grist query results through a template and write derived values back.
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (key matching, write planning).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config files, the Grist HTTP API,
//!   output files). The store sits behind the [`io::store::DataStore`] trait so
//!   tests can substitute an in-memory store.
//!
//! Stage modules ([`query`], [`render`], [`writeback`]) wrap core and I/O into
//! the steps of a run; [`merge`] wires them together for the CLI.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod merge;
pub mod query;
pub mod render;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod writeback;

pub use error::{MergeError, Result};
