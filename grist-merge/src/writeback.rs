//! Apply a write plan to the remote store.
//!
//! Entries are applied one call at a time, in plan order. There is no
//! transaction across the batch: when an entry fails, processing stops and the
//! entries applied before it stay applied.

use std::io::Write;

use tracing::{info, instrument, warn};

use crate::core::types::PlanEntry;
use crate::error::MergeError;
use crate::io::store::DataStore;

/// Counts of entries applied by [`apply_plan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub inserted: usize,
    pub updated: usize,
}

/// Issue one insert or update per entry. Stops at the first failure, which is
/// reported as [`MergeError::Write`] naming the entry's key.
#[instrument(skip_all, fields(table = %table, entries = plan.len()))]
pub fn apply_plan<S: DataStore + ?Sized>(
    store: &S,
    table: &str,
    plan: &[PlanEntry],
) -> Result<ApplySummary, MergeError> {
    let mut summary = ApplySummary::default();
    for (position, entry) in plan.iter().enumerate() {
        let result = match entry {
            PlanEntry::Insert { fields, .. } => store
                .add_record(table, fields)
                .map(|_| summary.inserted += 1),
            PlanEntry::Update { id, fields, .. } => store
                .update_record(table, *id, fields)
                .map(|()| summary.updated += 1),
        };
        if let Err(cause) = result {
            warn!(
                key = %entry.key(),
                applied = position,
                "write failed, earlier entries stay applied"
            );
            return Err(MergeError::Write {
                table: table.to_string(),
                key: entry.key().to_string(),
                action: entry.action(),
                cause,
            });
        }
    }
    info!(
        inserted = summary.inserted,
        updated = summary.updated,
        "write-back applied"
    );
    Ok(summary)
}

/// Describe `plan` one line per entry, for dry runs.
pub fn describe_plan<W: Write + ?Sized>(
    table: &str,
    plan: &[PlanEntry],
    out: &mut W,
) -> std::io::Result<()> {
    for entry in plan {
        let fields = serde_json::to_string(entry.fields()).unwrap_or_default();
        match entry {
            PlanEntry::Insert { key, .. } => {
                writeln!(out, "insert {table} key={key} fields={fields}")?;
            }
            PlanEntry::Update { id, key, .. } => {
                writeln!(out, "update {table} id={id} key={key} fields={fields}")?;
            }
        }
    }
    Ok(())
}
