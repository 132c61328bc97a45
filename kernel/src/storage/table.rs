// Table Data
//
// Row storage for one table plus its secondary indexes.
// Validation against the table definition happens in the engine;
// this layer only keeps rows and index entries consistent.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::value::{IndexKey, Row, Value};
use crate::catalog::{IndexDef, TableDef};

/// Physical row identifier, unique within a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct IndexData {
    def: IndexDef,
    entries: BTreeMap<IndexKey, BTreeSet<RowId>>,
}

impl IndexData {
    fn add(&mut self, id: RowId, row: &Row) {
        if let Some(key) = row.get(&self.def.column).and_then(Value::index_key) {
            self.entries.entry(key).or_default().insert(id);
        }
    }

    fn remove(&mut self, id: RowId, row: &Row) {
        if let Some(key) = row.get(&self.def.column).and_then(Value::index_key) {
            if let Some(ids) = self.entries.get_mut(&key) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TableData {
    next_row_id: u64,
    rows: BTreeMap<RowId, Row>,
    indexes: Vec<IndexData>,
}

impl TableData {
    pub fn new(def: &TableDef) -> Self {
        Self {
            next_row_id: 1,
            rows: BTreeMap::new(),
            indexes: def
                .indexes
                .iter()
                .map(|def| IndexData {
                    def: def.clone(),
                    entries: BTreeMap::new(),
                })
                .collect(),
        }
    }

    pub fn allocate(&mut self) -> RowId {
        let id = RowId(self.next_row_id);
        self.next_row_id += 1;
        id
    }

    /// Store a row under `id`, replacing any previous image.
    /// Returns the replaced image.
    pub fn put(&mut self, id: RowId, row: Row) -> Option<Row> {
        let previous = self.remove(id);
        for index in &mut self.indexes {
            index.add(id, &row);
        }
        self.rows.insert(id, row);
        previous
    }

    pub fn remove(&mut self, id: RowId) -> Option<Row> {
        let row = self.rows.remove(&id)?;
        for index in &mut self.indexes {
            index.remove(id, &row);
        }
        Some(row)
    }

    pub fn get(&self, id: RowId) -> Option<&Row> {
        self.rows.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RowId, &Row)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Ids of rows whose `column` equals `value`.
    /// Served from an index when one covers the column.
    pub fn lookup(&self, column: &str, value: &Value) -> Vec<RowId> {
        if let Some(index) = self.indexes.iter().find(|i| i.def.column == column) {
            if let Some(key) = value.index_key() {
                return index
                    .entries
                    .get(&key)
                    .map(|ids| ids.iter().copied().collect())
                    .unwrap_or_default();
            }
        }

        self.rows
            .iter()
            .filter(|(_, row)| row.get(column).unwrap_or(&Value::Null) == value)
            .map(|(id, _)| *id)
            .collect()
    }

    #[cfg(test)]
    fn index_entries(&self, column: &str) -> usize {
        self.indexes
            .iter()
            .find(|i| i.def.column == column)
            .map(|i| i.entries.values().map(BTreeSet::len).sum())
            .unwrap_or(0)
    }
}
