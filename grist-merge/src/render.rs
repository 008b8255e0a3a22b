//! Template rendering over query rows.
//!
//! Undefined variables are errors: a template that references a column the
//! query did not return fails with [`MergeError::Render`] rather than printing
//! an empty string. The same environment evaluates write-back column
//! expressions and the parameterized query text.

use std::collections::BTreeMap;
use std::fmt::{Display, Write as _};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use minijinja::{Environment, Error, ErrorKind, Expression, UndefinedBehavior, Value, context};
use tracing::{debug, instrument, warn};

use crate::core::key::KeyValue;
use crate::core::types::{DerivedRow, Fields, Row};
use crate::error::MergeError;
use crate::io::config::{MergeConfig, RenderMode, WriteBackConfig};

const OUTPUT_TEMPLATE: &str = "output";

/// Template engine wrapper around minijinja.
pub struct TemplateRenderer {
    env: Environment<'static>,
    mode: RenderMode,
    has_template: bool,
}

impl TemplateRenderer {
    /// Build the environment and compile the output template of `config`, so
    /// syntax errors surface before any query runs.
    pub fn new(config: &MergeConfig, base_dir: &Path) -> Result<Self> {
        let timezone = config
            .timezone
            .as_deref()
            .map(|tz| {
                tz.parse::<Tz>()
                    .map_err(|err| anyhow!("unknown timezone {tz:?}: {err}"))
            })
            .transpose()?;

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        register_filters(&mut env, timezone);

        let source = config.template_source(base_dir)?;
        if formats_local_time(config, source.as_deref()) {
            warn!("timezone not configured, format_timestamp uses local time");
        }
        let has_template = source.is_some();
        if let Some(source) = source {
            env.add_template_owned(OUTPUT_TEMPLATE, source)
                .context("compile template")?;
        }

        debug!(mode = ?config.render, has_template, "template environment ready");
        Ok(Self {
            env,
            mode: config.render,
            has_template,
        })
    }

    pub fn has_template(&self) -> bool {
        self.has_template
    }

    /// Compile every column expression of `write_back` against this
    /// environment.
    pub fn compile_columns(&self, write_back: &WriteBackConfig) -> Result<ColumnMapping<'_>> {
        let mut columns = Vec::with_capacity(write_back.columns.len());
        for (name, source) in &write_back.columns {
            let expression = self
                .env
                .compile_expression_owned(source.clone())
                .with_context(|| format!("compile expression for column {name}"))?;
            columns.push(CompiledColumn {
                name: name.clone(),
                source: source.clone(),
                expression,
            });
        }
        Ok(ColumnMapping {
            table: write_back.table.clone(),
            key_column: write_back.key_column.clone(),
            columns,
        })
    }

    /// Render the query text with `params` bound as variables.
    ///
    /// Without parameters the query is returned verbatim.
    pub fn render_query(
        &self,
        query: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<String, MergeError> {
        if params.is_empty() {
            return Ok(query.to_string());
        }
        self.env
            .render_str(query, params)
            .map_err(|err| MergeError::render(anyhow::Error::new(err).context("render query")))
    }

    /// Render the output template for `rows` into `out`, preserving row order.
    ///
    /// Returns the number of rendered blocks written (one per row in
    /// `per_row` mode, one in total in `all` mode, zero without a template).
    #[instrument(skip_all, fields(rows = rows.len(), mode = ?self.mode))]
    pub fn render_rows<W: Write + ?Sized>(
        &self,
        rows: &[Row],
        out: &mut W,
    ) -> Result<usize, MergeError> {
        if !self.has_template {
            return Ok(0);
        }
        let template = self
            .env
            .get_template(OUTPUT_TEMPLATE)
            .map_err(|err| MergeError::render(anyhow::Error::new(err)))?;

        match self.mode {
            RenderMode::PerRow => {
                for (index, row) in rows.iter().enumerate() {
                    let text = template.render(row).map_err(|err| {
                        MergeError::render(
                            anyhow::Error::new(err).context(format!("render row {index}")),
                        )
                    })?;
                    writeln!(out, "{text}")?;
                }
                Ok(rows.len())
            }
            RenderMode::All => {
                let text = template.render(context! { rows => rows }).map_err(|err| {
                    MergeError::render(anyhow::Error::new(err).context("render all rows"))
                })?;
                writeln!(out, "{text}")?;
                Ok(1)
            }
        }
    }
}

struct CompiledColumn<'env> {
    name: String,
    source: String,
    expression: Expression<'env, 'static>,
}

/// Write-back column expressions compiled once, evaluated per source row.
pub struct ColumnMapping<'env> {
    table: String,
    key_column: String,
    columns: Vec<CompiledColumn<'env>>,
}

impl ColumnMapping<'_> {
    /// Evaluate the column expressions against each row.
    ///
    /// The key value comes from the key column's expression when it is mapped,
    /// otherwise from the source row itself. A missing or null key fails.
    #[instrument(skip_all, fields(rows = rows.len(), table = %self.table))]
    pub fn derive_writes(&self, rows: &[Row]) -> Result<Vec<DerivedRow>, MergeError> {
        let key_column = self.key_column.as_str();
        let mut derived = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let ctx = Value::from_serialize(row);
            let mut fields = Fields::new();
            for column in &self.columns {
                let name = &column.name;
                let value = column.expression.eval(&ctx).map_err(|err| {
                    MergeError::render(
                        anyhow::Error::new(err)
                            .context(format!("row {index}: evaluate column {name}")),
                    )
                })?;
                if value.is_undefined() {
                    return Err(MergeError::render(anyhow!(
                        "row {index}: expression {:?} for column {name} is undefined",
                        column.source
                    )));
                }
                let json = serde_json::to_value(&value).map_err(|err| {
                    MergeError::render(
                        anyhow::Error::new(err)
                            .context(format!("row {index}: convert column {name}")),
                    )
                })?;
                fields.insert(name.clone(), json);
            }

            let key_value = fields
                .get(key_column)
                .or_else(|| row.get(key_column))
                .cloned()
                .ok_or_else(|| {
                    MergeError::render(anyhow!(
                        "row {index}: key column {key_column} is neither mapped nor returned by the query"
                    ))
                })?;
            let key = KeyValue::from_value(&key_value).ok_or_else(|| {
                MergeError::render(anyhow!(
                    "row {index}: key column {key_column} has no usable value ({key_value})"
                ))
            })?;
            derived.push(DerivedRow {
                index,
                key_value,
                key,
                fields,
            });
        }
        Ok(derived)
    }
}

/// True when no timezone is configured but the template or a column
/// expression uses `format_timestamp`.
fn formats_local_time(config: &MergeConfig, template: Option<&str>) -> bool {
    const FILTER: &str = "format_timestamp";
    config.timezone.is_none()
        && (template.is_some_and(|source| source.contains(FILTER))
            || config
                .write_back
                .as_ref()
                .is_some_and(|wb| wb.columns.values().any(|expr| expr.contains(FILTER))))
}

fn register_filters(env: &mut Environment<'static>, timezone: Option<Tz>) {
    env.add_filter(
        "format_timestamp",
        move |ts: f64, format: Option<String>| -> Result<String, Error> {
            let format = format.as_deref().unwrap_or("%c");
            let dt = to_datetime(ts)?;
            match timezone {
                Some(tz) => write_formatted(dt.with_timezone(&tz).format(format), format),
                None => write_formatted(dt.with_timezone(&Local).format(format), format),
            }
        },
    );
    env.add_filter(
        "format_date_timestamp",
        |ts: f64, format: Option<String>| -> Result<String, Error> {
            let format = format.as_deref().unwrap_or("%Y-%m-%d");
            write_formatted(to_datetime(ts)?.date_naive().format(format), format)
        },
    );
}

/// Convert Unix seconds (possibly fractional) to a UTC timestamp.
fn to_datetime(ts: f64) -> Result<DateTime<Utc>, Error> {
    if !ts.is_finite() {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("timestamp {ts} is not a finite number"),
        ));
    }
    let secs = ts.floor();
    let nanos = (((ts - secs) * 1e9).round() as u32).min(999_999_999);
    DateTime::from_timestamp(secs as i64, nanos).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("timestamp {ts} is out of range"),
        )
    })
}

/// chrono reports bad format strings through `fmt::Error`; turn that into a
/// template error instead of a panic.
fn write_formatted(formatted: impl Display, format: &str) -> Result<String, Error> {
    let mut out = String::new();
    write!(out, "{formatted}").map_err(|_| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid format string {format:?}"),
        )
    })?;
    Ok(out)
}
