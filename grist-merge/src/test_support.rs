//! Test-only helpers: an in-memory [`DataStore`] and row/record builders.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use serde_json::Value;
use tempfile::TempDir;

use crate::core::types::{Fields, Record, Row};
use crate::io::store::DataStore;

/// Build a row from a JSON object literal.
pub fn row(value: Value) -> Row {
    serde_json::from_value(value).expect("row must be a JSON object")
}

/// Build a record from an id and a JSON object of fields.
pub fn record(id: u64, fields: Value) -> Record {
    Record {
        id,
        fields: serde_json::from_value(fields).expect("fields must be a JSON object"),
    }
}

/// In-memory store: answers every query with the same rows and keeps tables
/// as plain vectors of records.
pub struct MemoryStore {
    doc_id: String,
    query_rows: Vec<Row>,
    query_error: Option<String>,
    queries: RefCell<Vec<String>>,
    tables: RefCell<BTreeMap<String, Vec<Record>>>,
    fail_writes_after: Option<usize>,
    write_attempts: Cell<usize>,
}

impl MemoryStore {
    pub fn new(doc_id: &str) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            query_rows: Vec::new(),
            query_error: None,
            queries: RefCell::new(Vec::new()),
            tables: RefCell::new(BTreeMap::new()),
            fail_writes_after: None,
            write_attempts: Cell::new(0),
        }
    }

    pub fn with_query_rows(mut self, rows: Vec<Row>) -> Self {
        self.query_rows = rows;
        self
    }

    /// Every query fails with `message`, as a store error response would.
    pub fn with_query_error(mut self, message: &str) -> Self {
        self.query_error = Some(message.to_string());
        self
    }

    pub fn with_table(self, table: &str, records: Vec<Record>) -> Self {
        self.tables.borrow_mut().insert(table.to_string(), records);
        self
    }

    /// Let the first `n` writes succeed and reject every later one.
    pub fn fail_writes_after(mut self, n: usize) -> Self {
        self.fail_writes_after = Some(n);
        self
    }

    /// Queries received so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.borrow().clone()
    }

    /// Current contents of `table` (empty if unknown).
    pub fn records(&self, table: &str) -> Vec<Record> {
        self.tables.borrow().get(table).cloned().unwrap_or_default()
    }

    /// Insert and update calls received, including rejected ones.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.get()
    }

    fn begin_write(&self) -> Result<()> {
        let attempt = self.write_attempts.get();
        self.write_attempts.set(attempt + 1);
        match self.fail_writes_after {
            Some(limit) if attempt >= limit => bail!("injected write failure"),
            _ => Ok(()),
        }
    }
}

impl DataStore for MemoryStore {
    fn document_id(&self) -> &str {
        &self.doc_id
    }

    fn sql(&self, query: &str) -> Result<Vec<Row>> {
        self.queries.borrow_mut().push(query.to_string());
        if let Some(message) = &self.query_error {
            bail!("store responded 400 Bad Request: {message}");
        }
        Ok(self.query_rows.clone())
    }

    fn fetch_records(&self, table: &str) -> Result<Vec<Record>> {
        self.tables
            .borrow()
            .get(table)
            .cloned()
            .ok_or_else(|| anyhow!("store responded 404 Not Found: table {table} not found"))
    }

    fn add_record(&self, table: &str, fields: &Fields) -> Result<u64> {
        self.begin_write()?;
        let mut tables = self.tables.borrow_mut();
        let records = tables
            .get_mut(table)
            .ok_or_else(|| anyhow!("table {table} not found"))?;
        let id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        records.push(Record {
            id,
            fields: fields.clone(),
        });
        Ok(id)
    }

    fn update_record(&self, table: &str, id: u64, fields: &Fields) -> Result<()> {
        self.begin_write()?;
        let mut tables = self.tables.borrow_mut();
        let record = tables
            .get_mut(table)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| anyhow!("record {id} not found in {table}"))?;
        for (column, value) in fields {
            record.fields.insert(column.clone(), value.clone());
        }
        Ok(())
    }
}

/// Scratch directory holding a configuration file (and any templates).
pub struct ConfigDir {
    dir: TempDir,
}

impl ConfigDir {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    /// Write `contents` to `name` inside the directory and return its path.
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}
