//! Orchestration for a single `grist-merge` invocation.

use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, info, instrument};

use crate::core::planner::plan_writes;
use crate::core::types::{PlanEntry, Row};
use crate::error::MergeError;
use crate::io::config::MergeConfig;
use crate::io::store::DataStore;
use crate::query::{bind_parameters, execute_query};
use crate::render::TemplateRenderer;
use crate::writeback::{ApplySummary, apply_plan, describe_plan};

/// Inputs for one merge run.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub config: MergeConfig,
    /// Directory relative template paths resolve against.
    pub config_dir: PathBuf,
    /// Positional values for `config.parameters`.
    pub parameters: Vec<String>,
    /// Plan write-back without applying it.
    pub dry_run: bool,
}

/// What a write-back step did.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Applied(ApplySummary),
    /// Dry run: the plan that would have been applied.
    Planned(Vec<PlanEntry>),
}

/// Result of a successful merge run.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Rows returned by the query.
    pub rows: usize,
    /// Rendered blocks written to the output.
    pub rendered: usize,
    /// Present when write-back is configured.
    pub write: Option<WriteOutcome>,
}

/// Run the configured query, render the template into the writer returned by
/// `open_out`, and apply the write-back plan.
///
/// Templates and expressions are compiled and parameters bound before the
/// store is contacted. `open_out` is called only when a template is configured
/// and the query has succeeded, so a failed run leaves an existing output file
/// as it was. Dry-run plans are described on `plan_out`.
#[instrument(skip_all, fields(doc = %request.config.grist_doc_id, dry_run = request.dry_run))]
pub fn run_merge<S, W, F, P>(
    store: &S,
    request: &MergeRequest,
    open_out: F,
    plan_out: &mut P,
) -> Result<MergeOutcome, MergeError>
where
    S: DataStore + ?Sized,
    W: Write,
    F: FnOnce() -> anyhow::Result<W>,
    P: Write + ?Sized,
{
    let config = &request.config;
    let params = bind_parameters(&config.parameters, &request.parameters)?;
    let renderer =
        TemplateRenderer::new(config, &request.config_dir).map_err(MergeError::config)?;
    let mapping = config
        .write_back
        .as_ref()
        .map(|write_back| renderer.compile_columns(write_back))
        .transpose()
        .map_err(MergeError::config)?;
    let sql = renderer.render_query(&config.query, &params)?;
    debug!(sql = %sql, "query prepared");

    let rows: Vec<Row> = execute_query(store, &sql)?.collect();

    let rendered = if renderer.has_template() {
        let mut out = open_out().map_err(MergeError::config)?;
        let rendered = renderer.render_rows(&rows, &mut out)?;
        out.flush()?;
        rendered
    } else {
        0
    };

    let write = match (&config.write_back, &mapping) {
        (Some(write_back), Some(mapping)) => {
            let derived = mapping.derive_writes(&rows)?;
            let existing = store.fetch_records(&write_back.table).map_err(|err| {
                MergeError::query(err.context(format!("fetch records of {}", write_back.table)))
            })?;
            let plan = plan_writes(
                &write_back.table,
                &write_back.key_column,
                derived,
                &existing,
            )?;
            let inserts = plan.iter().filter(|entry| entry.is_insert()).count();
            info!(
                table = %write_back.table,
                inserts,
                updates = plan.len() - inserts,
                "write-back planned"
            );
            if request.dry_run {
                describe_plan(&write_back.table, &plan, plan_out)?;
                Some(WriteOutcome::Planned(plan))
            } else {
                Some(WriteOutcome::Applied(apply_plan(
                    store,
                    &write_back.table,
                    &plan,
                )?))
            }
        }
        _ => None,
    };

    Ok(MergeOutcome {
        rows: rows.len(),
        rendered,
        write,
    })
}
