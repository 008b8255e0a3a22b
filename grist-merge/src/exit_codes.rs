//! Stable exit codes for the `grist-merge` CLI.
//!
//! Each error class gets its own code.

/// Query rendered and every configured write applied.
pub const OK: i32 = 0;
/// Output could not be written, or another failure outside the error classes below.
pub const FAILURE: i32 = 1;
/// Command-line usage error (reported by clap).
pub const USAGE: i32 = 2;
/// Configuration file missing, malformed, or inconsistent.
pub const CONFIG: i32 = 3;
/// The remote store rejected or could not answer a read.
pub const QUERY: i32 = 4;
/// A template or column expression failed to evaluate.
pub const RENDER: i32 = 5;
/// A write-back key matched more than one target row, or repeated among source rows.
pub const AMBIGUOUS_KEY: i32 = 6;
/// An insert or update was rejected by the remote store.
pub const WRITE: i32 = 7;
