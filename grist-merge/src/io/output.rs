//! Destination for rendered text.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::io::config::STDOUT;

/// Open `destination` for writing: `-` is stdout, anything else a file that
/// is created or truncated.
pub fn open_output(destination: &str) -> Result<Box<dyn Write>> {
    if destination == STDOUT {
        debug!("writing output to stdout");
        return Ok(Box::new(BufWriter::new(io::stdout().lock())));
    }
    let path = Path::new(destination);
    debug!(path = %path.display(), "writing output to file");
    let file = File::create(path).with_context(|| format!("create output {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}
