//! I/O helpers: configuration files, the remote store, and output sinks.

pub mod config;
pub mod output;
pub mod store;
