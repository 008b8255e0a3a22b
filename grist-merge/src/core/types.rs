//! Shared data types passed between the query, render and write-back stages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::key::KeyValue;

/// Column name to value mapping sent to, or read from, the store.
pub type Fields = BTreeMap<String, Value>;

/// Grist's reserved row identifier column.
pub const ROW_ID_COLUMN: &str = "id";

/// One result row of a query: column name to scalar value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Fields);

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }
}

/// Existing row of a target table as returned by the records endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    #[serde(default)]
    pub fields: Fields,
}

impl Record {
    /// Value of `column` for this record. `id` resolves to the row id.
    pub fn value(&self, column: &str) -> Option<Value> {
        if column == ROW_ID_COLUMN {
            return Some(Value::from(self.id));
        }
        self.fields.get(column).cloned()
    }
}

/// Values derived from one source row, ready for planning.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRow {
    /// Position of the source row in query order (0-indexed).
    pub index: usize,
    /// Key column value as read from the source or the key column expression.
    pub key_value: Value,
    /// Canonical form of `key_value` used for matching.
    pub key: KeyValue,
    /// Evaluated column expressions, one entry per configured column.
    pub fields: Fields,
}

/// One planned write against the target table.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanEntry {
    /// No target row has this key yet.
    Insert { key: KeyValue, fields: Fields },
    /// Exactly one target row (`id`) has this key. Only `fields` are changed.
    Update {
        id: u64,
        key: KeyValue,
        fields: Fields,
    },
}

impl PlanEntry {
    pub fn key(&self) -> &KeyValue {
        match self {
            Self::Insert { key, .. } | Self::Update { key, .. } => key,
        }
    }

    pub fn fields(&self) -> &Fields {
        match self {
            Self::Insert { fields, .. } | Self::Update { fields, .. } => fields,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Self::Insert { .. })
    }
}
