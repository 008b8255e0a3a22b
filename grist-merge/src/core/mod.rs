//! Deterministic, pure logic for write-back reconciliation.
//!
//! Core modules must be free of I/O side effects. They operate on rows and
//! records already fetched from the store and return plans suitable for tests.

pub mod key;
pub mod planner;
pub mod types;
