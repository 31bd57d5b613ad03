//! Storage collaborators.
//!
//! [`RecordStore`] is the boundary the import engine writes through: keyed
//! lookup, create, update, plus a unit of work with savepoints. Each row of
//! an import runs inside its own savepoint so a failed write rolls back that
//! row only, while the batch commits once at the end.
//!
//! Two implementations ship with the crate: [`MemoryStore`] (undo-journal
//! based) and [`JsonFileStore`], which persists a `MemoryStore` to disk on
//! commit.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    coerce::FieldValues, config::ImportConfig, data::Value, error::StoreError,
};

pub type RecordId = Uuid;

pub trait RecordStore {
    /// Finds the record whose fields equal every entry of `key`.
    fn find_by_key(&self, data_type: &str, key: &FieldValues)
    -> Result<Option<RecordId>, StoreError>;
    fn create_record(&mut self, data_type: &str, fields: &FieldValues)
    -> Result<RecordId, StoreError>;
    /// Overwrites only the fields present in `fields`.
    fn update_record(
        &mut self,
        data_type: &str,
        id: RecordId,
        fields: &FieldValues,
    ) -> Result<(), StoreError>;

    fn begin(&mut self) -> Result<(), StoreError>;
    fn savepoint(&mut self) -> Result<(), StoreError>;
    fn release_savepoint(&mut self) -> Result<(), StoreError>;
    fn rollback_to_savepoint(&mut self) -> Result<(), StoreError>;
    fn commit(&mut self) -> Result<(), StoreError>;
    fn rollback(&mut self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub fields: FieldValues,
}

impl StoredRecord {
    fn matches(&self, key: &FieldValues) -> bool {
        key.iter()
            .all(|(name, value)| self.fields.get(name) == Some(value))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableConstraints {
    #[serde(default)]
    pub unique: Vec<String>,
    #[serde(default)]
    pub max_length: BTreeMap<String, usize>,
}

type Tables = BTreeMap<String, Vec<StoredRecord>>;

/// Reverses one write.
#[derive(Debug, Clone)]
enum Undo {
    Created {
        data_type: String,
        id: RecordId,
    },
    Updated {
        data_type: String,
        id: RecordId,
        previous: FieldValues,
    },
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Tables,
    constraints: BTreeMap<String, TableConstraints>,
    /// Undo logs of the open unit of work: the transaction at index 0, then
    /// one per open savepoint.
    journal: Option<Vec<Vec<Undo>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store enforcing the `unique` and `max_length` settings of
    /// every configured field.
    pub fn from_config(config: &ImportConfig) -> Self {
        let mut store = Self::new();
        for (data_type, type_config) in &config.data_types {
            let mut constraints = TableConstraints::default();
            for field in &type_config.fields {
                if field.unique {
                    constraints.unique.push(field.name.clone());
                }
                if let Some(max) = field.max_length {
                    constraints.max_length.insert(field.name.clone(), max);
                }
            }
            store.constraints.insert(data_type.clone(), constraints);
        }
        store
    }

    pub fn with_constraints(mut self, data_type: &str, constraints: TableConstraints) -> Self {
        self.constraints.insert(data_type.to_string(), constraints);
        self
    }

    pub fn records(&self, data_type: &str) -> &[StoredRecord] {
        self.tables.get(data_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, data_type: &str, field: &str, value: &Value) -> Option<&StoredRecord> {
        self.records(data_type)
            .iter()
            .find(|r| r.fields.get(field) == Some(value))
    }

    pub fn in_transaction(&self) -> bool {
        self.journal.is_some()
    }

    fn log(&mut self, undo: Undo) {
        if let Some(level) = self.journal.as_mut().and_then(|levels| levels.last_mut()) {
            level.push(undo);
        }
    }

    fn undo(&mut self, entries: Vec<Undo>) {
        for entry in entries.into_iter().rev() {
            match entry {
                Undo::Created { data_type, id } => {
                    let Some(records) = self.tables.get_mut(&data_type) else {
                        continue;
                    };
                    if records.last().is_some_and(|r| r.id == id) {
                        records.pop();
                    } else {
                        records.retain(|r| r.id != id);
                    }
                    if records.is_empty() {
                        self.tables.remove(&data_type);
                    }
                }
                Undo::Updated {
                    data_type,
                    id,
                    previous,
                } => {
                    if let Some(record) = self
                        .tables
                        .get_mut(&data_type)
                        .and_then(|records| records.iter_mut().find(|r| r.id == id))
                    {
                        record.fields = previous;
                    }
                }
            }
        }
    }

    fn check_constraints(
        &self,
        data_type: &str,
        fields: &FieldValues,
        exclude: Option<RecordId>,
    ) -> Result<(), StoreError> {
        let Some(constraints) = self.constraints.get(data_type) else {
            return Ok(());
        };
        for (field, max) in &constraints.max_length {
            if let Some(text) = fields.get(field).and_then(Value::as_text) {
                let length = text.chars().count();
                if length > *max {
                    return Err(StoreError::ConstraintViolation(format!(
                        "value for '{field}' is {length} characters, limit is {max}"
                    )));
                }
            }
        }
        for field in &constraints.unique {
            let Some(value) = fields.get(field) else {
                continue;
            };
            let clash = self
                .records(data_type)
                .iter()
                .filter(|r| Some(r.id) != exclude)
                .any(|r| r.fields.get(field) == Some(value));
            if clash {
                return Err(StoreError::ConstraintViolation(format!(
                    "duplicate value '{value}' for unique field '{field}'"
                )));
            }
        }
        Ok(())
    }

    fn require_transaction(&self) -> Result<(), StoreError> {
        if self.journal.is_none() {
            return Err(StoreError::Unexpected("no open transaction".to_string()));
        }
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn find_by_key(
        &self,
        data_type: &str,
        key: &FieldValues,
    ) -> Result<Option<RecordId>, StoreError> {
        Ok(self
            .records(data_type)
            .iter()
            .find(|r| r.matches(key))
            .map(|r| r.id))
    }

    fn create_record(
        &mut self,
        data_type: &str,
        fields: &FieldValues,
    ) -> Result<RecordId, StoreError> {
        self.check_constraints(data_type, fields, None)?;
        let id = Uuid::new_v4();
        self.tables
            .entry(data_type.to_string())
            .or_default()
            .push(StoredRecord {
                id,
                fields: fields.clone(),
            });
        self.log(Undo::Created {
            data_type: data_type.to_string(),
            id,
        });
        Ok(id)
    }

    fn update_record(
        &mut self,
        data_type: &str,
        id: RecordId,
        fields: &FieldValues,
    ) -> Result<(), StoreError> {
        let previous = self
            .records(data_type)
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.fields.clone())
            .ok_or_else(|| StoreError::Unexpected(format!("record {id} not found")))?;
        let mut merged = previous.clone();
        merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.check_constraints(data_type, &merged, Some(id))?;
        if let Some(record) = self
            .tables
            .get_mut(data_type)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
        {
            record.fields = merged;
        }
        self.log(Undo::Updated {
            data_type: data_type.to_string(),
            id,
            previous,
        });
        Ok(())
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        if self.journal.is_some() {
            return Err(StoreError::Unexpected(
                "transaction already open".to_string(),
            ));
        }
        self.journal = Some(vec![Vec::new()]);
        Ok(())
    }

    fn savepoint(&mut self) -> Result<(), StoreError> {
        let levels = self
            .journal
            .as_mut()
            .ok_or_else(|| StoreError::Unexpected("no open transaction".to_string()))?;
        levels.push(Vec::new());
        Ok(())
    }

    /// Keeps the savepoint's writes; they stay revertible by the enclosing
    /// level.
    fn release_savepoint(&mut self) -> Result<(), StoreError> {
        let levels = self
            .journal
            .as_mut()
            .filter(|levels| levels.len() > 1)
            .ok_or_else(|| StoreError::Unexpected("no savepoint to release".to_string()))?;
        let released = levels.pop().unwrap_or_default();
        if let Some(outer) = levels.last_mut() {
            outer.extend(released);
        }
        Ok(())
    }

    fn rollback_to_savepoint(&mut self) -> Result<(), StoreError> {
        let entries = self
            .journal
            .as_mut()
            .filter(|levels| levels.len() > 1)
            .and_then(|levels| levels.pop())
            .ok_or_else(|| StoreError::Unexpected("no savepoint to roll back".to_string()))?;
        self.undo(entries);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.require_transaction()?;
        self.journal = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let levels = self
            .journal
            .take()
            .ok_or_else(|| StoreError::Unexpected("no open transaction".to_string()))?;
        for entries in levels.into_iter().rev() {
            self.undo(entries);
        }
        Ok(())
    }
}

/// A [`MemoryStore`] persisted as pretty JSON; the file is rewritten on
/// every commit.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    pub fn open(path: &Path, config: &ImportConfig) -> Result<Self> {
        let mut inner = MemoryStore::from_config(config);
        if path.exists() {
            let file = File::open(path).with_context(|| format!("Opening store {path:?}"))?;
            inner.tables = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Parsing store {path:?}"))?;
            debug!(
                "Loaded {} table(s) from {:?}",
                inner.tables.len(),
                path
            );
        }
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    fn persist(&self) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("Creating store {:?}", self.path))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.inner.tables)
            .context("Writing store JSON")
    }
}

impl RecordStore for JsonFileStore {
    fn find_by_key(
        &self,
        data_type: &str,
        key: &FieldValues,
    ) -> Result<Option<RecordId>, StoreError> {
        self.inner.find_by_key(data_type, key)
    }

    fn create_record(
        &mut self,
        data_type: &str,
        fields: &FieldValues,
    ) -> Result<RecordId, StoreError> {
        self.inner.create_record(data_type, fields)
    }

    fn update_record(
        &mut self,
        data_type: &str,
        id: RecordId,
        fields: &FieldValues,
    ) -> Result<(), StoreError> {
        self.inner.update_record(data_type, id, fields)
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.inner.begin()
    }

    fn savepoint(&mut self) -> Result<(), StoreError> {
        self.inner.savepoint()
    }

    fn release_savepoint(&mut self) -> Result<(), StoreError> {
        self.inner.release_savepoint()
    }

    fn rollback_to_savepoint(&mut self) -> Result<(), StoreError> {
        self.inner.rollback_to_savepoint()
    }

    /// Writes the working tables first; the inner transaction stays open
    /// when the write fails so the caller can still roll back.
    fn commit(&mut self) -> Result<(), StoreError> {
        self.inner.require_transaction()?;
        self.persist()
            .map_err(|err| StoreError::Unexpected(format!("{err:#}")))?;
        self.inner.commit()?;
        info!("Store written to {:?}", self.path);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.inner.rollback()
    }
}
