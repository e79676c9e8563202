//! In-memory store, optionally persisted as a JSON snapshot.
//!
//! Behaves like the remote editor for everything the sync engine relies on:
//! unknown fields are rejected on write and only scalar fields can be
//! created. `--store-file` points the CLI at one of these.
use super::{EnsureReport, RecordStore, RemoteTable, Row, RowFilter, Schema};
use crate::flat::{codec, FieldType, FlatRecord, Table};
use crate::util::{read_json, write_json};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredTable {
    pub id: String,
    pub title: String,
    pub schema: Schema,
    #[serde(default)]
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    next_row: u64,
    #[serde(default)]
    tables: Vec<StoredTable>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    path: Option<PathBuf>,
    snapshot: Snapshot,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// One empty table per canonical table, titled by its canonical name and
    /// holding only its key field.
    pub fn with_canonical_tables() -> Self {
        let mut store = Self::new();
        for table in Table::ALL {
            let schema = Schema::from([(table.key_field().to_string(), FieldType::Title)]);
            store.add_table(table.name(), schema);
        }
        store
    }

    /// Load the snapshot at `path`; a missing file starts from the canonical
    /// empty tables.
    pub fn open(path: &Path) -> Result<Self> {
        let mut store = if path.exists() {
            let snapshot: Snapshot = read_json(path)
                .with_context(|| format!("load store snapshot {}", path.display()))?;
            Self {
                path: None,
                snapshot,
            }
        } else {
            tracing::info!(path = %path.display(), "no store snapshot; starting with empty tables");
            Self::with_canonical_tables()
        };
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    /// Write the snapshot back to the file it was opened from, if any.
    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => write_json(path, &self.snapshot),
            None => Ok(()),
        }
    }

    pub fn add_table(&mut self, title: &str, schema: Schema) -> String {
        let id = format!("db-{}", self.snapshot.tables.len() + 1);
        self.snapshot.tables.push(StoredTable {
            id: id.clone(),
            title: title.to_string(),
            schema,
            rows: Vec::new(),
        });
        id
    }

    #[cfg(test)]
    pub fn table_by_title(&self, title: &str) -> Option<&StoredTable> {
        self.snapshot.tables.iter().find(|table| table.title == title)
    }

    /// Overwrite one field of a stored row, as an editor would.
    #[cfg(test)]
    pub fn set_field(
        &mut self,
        row_id: &str,
        name: &str,
        value: crate::flat::FieldValue,
    ) -> Result<()> {
        let row = self.row_mut(row_id)?;
        row.fields.insert(name, value);
        Ok(())
    }

    fn table(&self, table_id: &str) -> Result<&StoredTable> {
        self.snapshot
            .tables
            .iter()
            .find(|table| table.id == table_id)
            .ok_or_else(|| anyhow!("no table with id {table_id}"))
    }

    fn table_mut(&mut self, table_id: &str) -> Result<&mut StoredTable> {
        self.snapshot
            .tables
            .iter_mut()
            .find(|table| table.id == table_id)
            .ok_or_else(|| anyhow!("no table with id {table_id}"))
    }

    fn row_mut(&mut self, row_id: &str) -> Result<&mut Row> {
        self.snapshot
            .tables
            .iter_mut()
            .flat_map(|table| table.rows.iter_mut())
            .find(|row| row.id == row_id)
            .ok_or_else(|| anyhow!("no row with id {row_id}"))
    }
}

fn check_fields(table: &StoredTable, record: &FlatRecord) -> Result<()> {
    match record.field_names().find(|name| !table.schema.contains_key(*name)) {
        Some(name) => Err(anyhow!("table {} has no field {name:?}", table.title)),
        None => Ok(()),
    }
}

impl RecordStore for MemoryStore {
    fn list_tables(&mut self) -> Result<Vec<RemoteTable>> {
        Ok(self
            .snapshot
            .tables
            .iter()
            .map(|table| RemoteTable {
                id: table.id.clone(),
                title: table.title.clone(),
            })
            .collect())
    }

    fn get_schema(&mut self, table_id: &str) -> Result<Schema> {
        Ok(self.table(table_id)?.schema.clone())
    }

    fn ensure_fields(
        &mut self,
        table_id: &str,
        fields: &[(String, FieldType)],
    ) -> Result<EnsureReport> {
        let table = self.table_mut(table_id)?;
        let mut report = EnsureReport::default();
        for (name, ty) in fields {
            if table.schema.contains_key(name) {
                continue;
            }
            if ty.is_auto_creatable() {
                table.schema.insert(name.clone(), *ty);
                report.created.push(name.clone());
            } else if !report.skipped.contains(name) {
                report.skipped.push(name.clone());
            }
        }
        Ok(report)
    }

    fn find_by_key(
        &mut self,
        table_id: &str,
        key_field: &str,
        key: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .table(table_id)?
            .rows
            .iter()
            .find(|row| codec::choice_or_text(&row.fields, key_field) == key)
            .map(|row| row.id.clone()))
    }

    fn create_row(&mut self, table_id: &str, record: &FlatRecord) -> Result<String> {
        check_fields(self.table(table_id)?, record)?;
        self.snapshot.next_row += 1;
        let id = format!("row-{}", self.snapshot.next_row);
        self.table_mut(table_id)?.rows.push(Row {
            id: id.clone(),
            fields: record.clone(),
        });
        Ok(id)
    }

    fn update_row(&mut self, row_id: &str, record: &FlatRecord) -> Result<()> {
        let table = self
            .snapshot
            .tables
            .iter()
            .find(|table| table.rows.iter().any(|row| row.id == row_id))
            .ok_or_else(|| anyhow!("no row with id {row_id}"))?;
        check_fields(table, record)?;
        let row = self.row_mut(row_id)?;
        for (name, value) in record.iter() {
            row.fields.insert(name, value.clone());
        }
        Ok(())
    }

    fn query(&mut self, table_id: &str, filter: Option<&RowFilter>) -> Result<Vec<Row>> {
        Ok(self
            .table(table_id)?
            .rows
            .iter()
            .filter(|row| match filter {
                Some(filter) => filter.matches(&row.fields),
                None => true,
            })
            .cloned()
            .collect())
    }
}
