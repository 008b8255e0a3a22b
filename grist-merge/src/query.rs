//! Query execution against the remote store.

use std::collections::BTreeMap;

use anyhow::anyhow;
use tracing::{info, instrument};

use crate::core::types::Row;
use crate::error::MergeError;
use crate::io::store::DataStore;

/// Rows of one query result, in result order.
///
/// Single pass: iterating again requires running the query again.
#[derive(Debug)]
pub struct Rows {
    inner: std::vec::IntoIter<Row>,
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Rows {}

/// Pair declared parameter names with the values given on the command line.
///
/// The counts must match exactly.
pub fn bind_parameters(
    names: &[String],
    values: &[String],
) -> Result<BTreeMap<String, String>, MergeError> {
    if names.len() != values.len() {
        return Err(MergeError::config(anyhow!(
            "{} parameters required, {} supplied",
            names.len(),
            values.len()
        )));
    }
    Ok(names.iter().cloned().zip(values.iter().cloned()).collect())
}

/// Issue `sql` once against `store`. Failures are not retried.
#[instrument(skip_all, fields(doc = %store.document_id()))]
pub fn execute_query<S: DataStore + ?Sized>(store: &S, sql: &str) -> Result<Rows, MergeError> {
    let rows = store
        .sql(sql)
        .map_err(|err| MergeError::query(err.context(format!("run query {sql:?}"))))?;
    info!(rows = rows.len(), "query returned");
    Ok(Rows {
        inner: rows.into_iter(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryStore, row};
    use serde_json::json;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parameters_bind_by_position() {
        let bound =
            bind_parameters(&strings(&["since", "team"]), &strings(&["2024", "ops"])).expect("bind");
        assert_eq!(bound.get("since").map(String::as_str), Some("2024"));
        assert_eq!(bound.get("team").map(String::as_str), Some("ops"));
    }

    #[test]
    fn parameter_count_mismatch_is_a_config_error() {
        let err = bind_parameters(&strings(&["since"]), &[]).expect_err("mismatch");
        assert!(matches!(err, MergeError::Config(_)));
        assert!(err.to_string().contains("1 parameters required, 0 supplied"));
    }

    #[test]
    fn rows_arrive_in_result_order() {
        let store = MemoryStore::new("doc").with_query_rows(vec![
            row(json!({"id": 1, "name": "Ann"})),
            row(json!({"id": 2, "name": "Bo"})),
        ]);

        let rows = execute_query(&store, "SELECT id, name FROM People").expect("query");
        assert_eq!(rows.len(), 2);
        let names: Vec<_> = rows.map(|r| r.get("name").cloned()).collect();

        assert_eq!(names, vec![Some(json!("Ann")), Some(json!("Bo"))]);
        assert_eq!(store.queries(), vec!["SELECT id, name FROM People"]);
    }

    #[test]
    fn store_failure_is_a_query_error() {
        let store = MemoryStore::new("doc").with_query_error("no such table: Peple");

        let err = execute_query(&store, "SELECT * FROM Peple").expect_err("query fails");

        assert!(matches!(err, MergeError::Query(_)));
        assert!(err.to_string().contains("no such table"), "{err}");
        assert_eq!(store.queries().len(), 1);
    }
}
