//! Remote tabular store capability.
//!
//! The sync engine only needs a handful of operations from the external
//! editor: discover tables and their schemas, create missing scalar fields,
//! and read/write rows. Transport concerns (authentication, rate limiting,
//! pagination) stay behind [`RecordStore`].
mod binding;
mod memory;
mod notion;
mod props;

pub use binding::TableBinding;
pub use memory::MemoryStore;
pub use notion::{extract_page_id, NotionOptions, NotionStore};

use crate::flat::{FieldType, FlatRecord};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A table as the remote side lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTable {
    pub id: String,
    pub title: String,
}

/// Remote field name -> structural type.
pub type Schema = BTreeMap<String, FieldType>;

/// A stored row; field names are the remote side's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    pub fields: FlatRecord,
}

/// Outcome of [`RecordStore::ensure_fields`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureReport {
    pub created: Vec<String>,
    /// Fields that were missing but cannot be created automatically.
    pub skipped: Vec<String>,
}

/// Row filter understood by every store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub field: String,
    pub checked: bool,
}

impl RowFilter {
    /// Rows whose checkbox `field` is ticked.
    pub fn checked(field: &str) -> Self {
        Self {
            field: field.to_string(),
            checked: true,
        }
    }

    pub fn matches(&self, record: &FlatRecord) -> bool {
        crate::flat::codec::boolean(record, &self.field) == self.checked
    }
}

pub trait RecordStore {
    fn list_tables(&mut self) -> Result<Vec<RemoteTable>>;

    fn get_schema(&mut self, table_id: &str) -> Result<Schema>;

    /// Create the missing fields among `fields`. Only scalar types
    /// ([`FieldType::is_auto_creatable`]) are created; the rest are reported
    /// as skipped.
    fn ensure_fields(
        &mut self,
        table_id: &str,
        fields: &[(String, FieldType)],
    ) -> Result<EnsureReport>;

    /// Id of the row whose key field equals `key`.
    fn find_by_key(&mut self, table_id: &str, key_field: &str, key: &str)
        -> Result<Option<String>>;

    fn create_row(&mut self, table_id: &str, record: &FlatRecord) -> Result<String>;

    /// Overwrite the fields present in `record`; other fields are untouched.
    fn update_row(&mut self, row_id: &str, record: &FlatRecord) -> Result<()>;

    /// Every row matching `filter`, across all pages.
    fn query(&mut self, table_id: &str, filter: Option<&RowFilter>) -> Result<Vec<Row>>;
}
