//! Write-back reconciliation: decide insert vs update per source row.

use std::collections::HashMap;

use anyhow::anyhow;

use crate::core::key::KeyValue;
use crate::core::types::{DerivedRow, PlanEntry, ROW_ID_COLUMN, Record};
use crate::error::MergeError;

/// Index target records by their key column value.
///
/// Records whose key is null or not a scalar are left out; no source row can
/// match them.
pub fn index_records(records: &[Record], key_column: &str) -> HashMap<KeyValue, Vec<u64>> {
    let mut index: HashMap<KeyValue, Vec<u64>> = HashMap::new();
    for record in records {
        let Some(key) = record
            .value(key_column)
            .as_ref()
            .and_then(KeyValue::from_value)
        else {
            continue;
        };
        index.entry(key).or_default().push(record.id);
    }
    index
}

/// Produce one plan entry per derived row, in row order.
///
/// - key absent from `existing`: `Insert`, carrying the key column unless it is
///   the store-assigned `id`
/// - key present once: `Update` of that record with only the mapped columns
/// - key present more than once: [`MergeError::AmbiguousKey`]
///
/// Two source rows with the same key fail with [`MergeError::DuplicateKey`].
/// With `id` as the key column a row id absent from `existing` cannot be
/// inserted, since the store assigns ids; it fails with [`MergeError::Write`].
pub fn plan_writes(
    table: &str,
    key_column: &str,
    rows: Vec<DerivedRow>,
    existing: &[Record],
) -> Result<Vec<PlanEntry>, MergeError> {
    check_unique_source_keys(table, key_column, &rows)?;
    let index = index_records(existing, key_column);

    let mut plan = Vec::with_capacity(rows.len());
    for row in rows {
        let DerivedRow {
            key,
            key_value,
            mut fields,
            ..
        } = row;
        fields.remove(ROW_ID_COLUMN);

        match index.get(&key).map(Vec::as_slice) {
            None | Some([]) if key_column == ROW_ID_COLUMN => {
                return Err(MergeError::Write {
                    table: table.to_string(),
                    key: key.to_string(),
                    action: "update",
                    cause: anyhow!("no record with id {key}; row ids are assigned by the store"),
                });
            }
            None | Some([]) => {
                fields.entry(key_column.to_string()).or_insert(key_value);
                plan.push(PlanEntry::Insert { key, fields });
            }
            Some([id]) => plan.push(PlanEntry::Update {
                id: *id,
                key,
                fields,
            }),
            Some(ids) => {
                return Err(MergeError::AmbiguousKey {
                    table: table.to_string(),
                    column: key_column.to_string(),
                    key: key.to_string(),
                    matches: ids.len(),
                });
            }
        }
    }
    Ok(plan)
}

fn check_unique_source_keys(
    table: &str,
    key_column: &str,
    rows: &[DerivedRow],
) -> Result<(), MergeError> {
    let mut seen: HashMap<&KeyValue, usize> = HashMap::new();
    for row in rows {
        if let Some(first_row) = seen.insert(&row.key, row.index) {
            return Err(MergeError::DuplicateKey {
                table: table.to_string(),
                column: key_column.to_string(),
                key: row.key.to_string(),
                first_row,
                row: row.index,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Fields;
    use serde_json::{Value, json};

    fn record(id: u64, fields: Value) -> Record {
        serde_json::from_value(json!({ "id": id, "fields": fields })).expect("record")
    }

    fn derived(index: usize, key_value: Value, fields: Value) -> DerivedRow {
        DerivedRow {
            index,
            key: KeyValue::from_value(&key_value).expect("scalar key"),
            key_value,
            fields: serde_json::from_value(fields).expect("fields"),
        }
    }

    #[test]
    fn unmatched_key_is_inserted_with_key_column() {
        let existing = vec![record(1, json!({"email": "a@x.com", "name": "Ann"}))];
        let rows = vec![derived(0, json!("b@x.com"), json!({"name": "Bo"}))];

        let plan = plan_writes("People", "email", rows, &existing).expect("plan");

        let expected: Fields =
            serde_json::from_value(json!({"email": "b@x.com", "name": "Bo"})).expect("fields");
        assert_eq!(
            plan,
            vec![PlanEntry::Insert {
                key: KeyValue::Text("b@x.com".to_string()),
                fields: expected,
            }]
        );
    }

    #[test]
    fn single_match_updates_only_mapped_columns() {
        let existing = vec![
            record(1, json!({"email": "a@x.com", "name": "Ann", "age": 40})),
            record(2, json!({"email": "b@x.com", "name": "Bo", "age": 30})),
        ];
        let rows = vec![derived(0, json!("b@x.com"), json!({"name": "Bob"}))];

        let plan = plan_writes("People", "email", rows, &existing).expect("plan");

        assert_eq!(plan.len(), 1);
        match &plan[0] {
            PlanEntry::Update { id, fields, .. } => {
                assert_eq!(*id, 2);
                assert_eq!(fields.len(), 1);
                assert_eq!(fields.get("name"), Some(&json!("Bob")));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_target_keys_are_ambiguous() {
        let existing = vec![
            record(1, json!({"email": "a@x.com"})),
            record(2, json!({"email": "a@x.com"})),
        ];
        let rows = vec![derived(0, json!("a@x.com"), json!({"name": "Ann"}))];

        let err = plan_writes("People", "email", rows, &existing).expect_err("ambiguous");
        match err {
            MergeError::AmbiguousKey {
                table,
                column,
                matches,
                ..
            } => {
                assert_eq!(table, "People");
                assert_eq!(column, "email");
                assert_eq!(matches, 2);
            }
            other => panic!("expected ambiguous key, got {other:?}"),
        }
    }

    #[test]
    fn row_id_key_matches_record_id_and_is_never_written() {
        let existing = vec![record(1, json!({"email": "old@x.com"}))];
        let rows = vec![derived(0, json!(1), json!({"id": 1, "email": "new@x.com"}))];

        let plan = plan_writes("People", "id", rows, &existing).expect("plan");

        assert_eq!(plan[0].action(), "update");
        assert!(!plan[0].fields().contains_key("id"));
    }

    #[test]
    fn unknown_row_id_is_not_inserted() {
        let existing = vec![record(1, json!({"email": "old@x.com"}))];
        let rows = vec![
            derived(0, json!(1), json!({"email": "new@x.com"})),
            derived(1, json!(9), json!({"email": "z@x.com"})),
        ];

        let err = plan_writes("People", "id", rows, &existing).expect_err("unknown id");

        match &err {
            MergeError::Write { key, action, .. } => {
                assert_eq!(key, "9");
                assert_eq!(*action, "update");
            }
            other => panic!("expected write error, got {other:?}"),
        }
        assert!(err.to_string().contains("no record with id 9"), "{err}");
    }

    #[test]
    fn repeated_source_key_is_rejected() {
        let rows = vec![
            derived(0, json!("A"), json!({"label": "first"})),
            derived(1, json!("B"), json!({"label": "other"})),
            derived(2, json!("A"), json!({"label": "second"})),
        ];

        let err = plan_writes("T", "code", rows, &[]).expect_err("duplicate");

        match err {
            MergeError::DuplicateKey {
                column,
                key,
                first_row,
                row,
                ..
            } => {
                assert_eq!(column, "code");
                assert_eq!(key, "\"A\"");
                assert_eq!((first_row, row), (0, 2));
            }
            other => panic!("expected duplicate key, got {other:?}"),
        }
    }

    #[test]
    fn integral_float_repeats_integer_key() {
        let rows = vec![
            derived(0, json!(2), json!({})),
            derived(1, json!(2.0), json!({})),
        ];
        assert!(matches!(
            plan_writes("Codes", "code", rows, &[]),
            Err(MergeError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn one_entry_per_row_in_row_order() {
        let existing = vec![record(5, json!({"code": 2}))];
        let rows = vec![
            derived(0, json!(1), json!({"label": "one"})),
            derived(1, json!(2.0), json!({"label": "two"})),
            derived(2, json!(3), json!({"label": "three"})),
        ];

        let plan = plan_writes("Codes", "code", rows, &existing).expect("plan");

        let actions: Vec<&str> = plan.iter().map(PlanEntry::action).collect();
        assert_eq!(actions, vec!["insert", "update", "insert"]);
    }

    #[test]
    fn records_without_scalar_key_are_not_indexed() {
        let existing = vec![
            record(1, json!({"code": null})),
            record(2, json!({"code": ["L", 1]})),
            record(3, json!({})),
        ];
        assert!(index_records(&existing, "code").is_empty());
    }
}
