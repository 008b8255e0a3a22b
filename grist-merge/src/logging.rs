//! Tracing setup for the CLI.
//!
//! Diagnostics go to stderr so rendered output on stdout stays clean. They
//! are separate from the product output: `RUST_LOG` never changes what is
//! rendered or written back.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn`, or `debug` for this crate when
/// `verbose` is set.
///
/// # Example
/// ```bash
/// RUST_LOG=grist_merge=debug grist-merge merge.yml
/// ```
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("warn,grist_merge=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
