//! Batch orchestration for one CSV upload.
//!
//! An import moves through `Decoding → HeaderCheck → RowLoop → Finalize`.
//! File-level and configuration-level failures end the import before any
//! row is written. Row-level failures are recorded against their line
//! number and the loop moves on.
//!
//! The row loop runs inside a single unit of work on the store. Each row
//! gets its own savepoint: a failed write rolls back that row alone, and
//! every successful row is kept when the unit commits at the end.

use std::path::Path;

use itertools::Itertools;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    coerce::{CoercedRecord, CoercionPlan, ImportRow, coerce_row},
    error::{ImportError, StoreError},
    header::{read_header, validate_headers},
    io_utils::{SourceRow, decode_upload, open_csv_reader, read_data_rows},
    mapping::{MappingRegistry, MappingSnapshot},
    schema::SchemaDescriptor,
    store::RecordStore,
    upsert::{UpsertTag, upsert},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Success,
    PartialSuccess,
    Error,
}

/// Why an import ended in [`ImportStatus::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Unusable upload: file type, encoding, header, CSV syntax, or no row
    /// could be imported.
    Structural,
    /// The mapping or schema configuration is broken.
    Configuration,
    /// The store failed outside of any single row.
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub status: ImportStatus,
    pub message: String,
    pub created_count: usize,
    pub updated_count: usize,
    pub errors: Vec<String>,
    #[serde(skip)]
    pub failure: Option<FailureClass>,
}

impl ImportOutcome {
    fn failed(failure: FailureClass, message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            status: ImportStatus::Error,
            message: message.into(),
            created_count: 0,
            updated_count: 0,
            errors,
            failure: Some(failure),
        }
    }

    /// Status code for transports that speak HTTP.
    pub fn http_status(&self) -> u16 {
        match (self.status, self.failure) {
            (ImportStatus::Success, _) => 200,
            (ImportStatus::PartialSuccess, _) => 207,
            (ImportStatus::Error, Some(FailureClass::Configuration | FailureClass::Storage)) => {
                500
            }
            (ImportStatus::Error, _) => 400,
        }
    }

    pub fn processed(&self) -> usize {
        self.created_count + self.updated_count
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl From<ImportError> for ImportOutcome {
    fn from(err: ImportError) -> Self {
        let detail = vec![err.to_string()];
        if err.is_configuration() {
            return Self::failed(
                FailureClass::Configuration,
                "import configuration error",
                detail,
            );
        }
        let message = match &err {
            ImportError::InvalidFileType(_) => "invalid file type: upload a .csv file".to_string(),
            ImportError::Encoding => "invalid encoding".to_string(),
            ImportError::EmptyFile => "the CSV file is empty".to_string(),
            ImportError::HeaderMismatch { .. } => "the CSV file has an invalid format".to_string(),
            other => other.to_string(),
        };
        Self::failed(FailureClass::Structural, message, detail)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImportRequest<'a> {
    pub data_type: &'a str,
    pub file_name: &'a str,
    pub contents: &'a [u8],
}

pub fn has_csv_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

pub struct Importer<'a, M: ?Sized, S: ?Sized> {
    mappings: &'a M,
    schema: &'a S,
}

impl<'a, M, S> Importer<'a, M, S>
where
    M: MappingRegistry + ?Sized,
    S: SchemaDescriptor + ?Sized,
{
    pub fn new(mappings: &'a M, schema: &'a S) -> Self {
        Self { mappings, schema }
    }

    /// Takes the mapping snapshot and resolves the coercion plan.
    pub fn prepare(&self, data_type: &str) -> Result<CoercionPlan, ImportError> {
        let snapshot = MappingSnapshot::take(self.mappings, data_type)?;
        CoercionPlan::resolve(&snapshot, self.schema)
    }

    /// Runs a whole import. `store` is borrowed exclusively for the
    /// duration, so imports against one store never interleave.
    pub fn import<R>(&self, store: &mut R, request: &ImportRequest<'_>) -> ImportOutcome
    where
        R: RecordStore + ?Sized,
    {
        info!(
            "Importing '{}' as data type '{}' ({} byte(s))",
            request.file_name,
            request.data_type,
            request.contents.len()
        );
        let outcome = match self.read_upload(request) {
            Ok((plan, rows)) if rows.is_empty() => {
                debug!("Header-only upload for '{}'", plan.data_type());
                ImportOutcome {
                    status: ImportStatus::Success,
                    message: "no data rows to import".to_string(),
                    created_count: 0,
                    updated_count: 0,
                    errors: Vec::new(),
                    failure: None,
                }
            }
            Ok((plan, rows)) => self.run_rows(store, &plan, &rows),
            Err(err) => {
                error!("Import of '{}' rejected: {err}", request.file_name);
                ImportOutcome::from(err)
            }
        };
        info!(
            "Import finished with {:?}: {} created, {} updated, {} error(s)",
            outcome.status,
            outcome.created_count,
            outcome.updated_count,
            outcome.errors.len()
        );
        outcome
    }

    /// Everything that can fail for the file as a whole: file type,
    /// configuration, decoding, header and CSV syntax.
    fn read_upload(
        &self,
        request: &ImportRequest<'_>,
    ) -> Result<(CoercionPlan, Vec<SourceRow>), ImportError> {
        if !has_csv_extension(request.file_name) {
            return Err(ImportError::InvalidFileType(request.file_name.to_string()));
        }
        let plan = self.prepare(request.data_type)?;
        let text = decode_upload(request.contents)?;
        let mut reader = open_csv_reader(&text);
        let actual = read_header(&mut reader)?;
        validate_headers(&plan.headers(), &actual)?;
        let rows = read_data_rows(&mut reader, &text)?;
        Ok((plan, rows))
    }

    fn run_rows<R>(
        &self,
        store: &mut R,
        plan: &CoercionPlan,
        rows: &[SourceRow],
    ) -> ImportOutcome
    where
        R: RecordStore + ?Sized,
    {
        if let Err(err) = store.begin() {
            return ImportOutcome::failed(
                FailureClass::Storage,
                "could not start the import transaction",
                vec![err.to_string()],
            );
        }

        let headers = plan.headers();
        let mut created = 0usize;
        let mut updated = 0usize;
        let mut errors = Vec::new();

        for SourceRow { line, record } in rows {
            let line = *line;
            if record.len() != headers.len() {
                errors.push(format!(
                    "row {line}: expected {} columns, found {}",
                    headers.len(),
                    record.len()
                ));
                continue;
            }
            let mut row = ImportRow::from_record(line, &headers, record);
            let coerced = match coerce_row(plan, &row) {
                Ok(coerced) => coerced,
                Err(field_errors) => {
                    row.errors.extend(field_errors);
                    debug!("{}", row.error_message());
                    errors.push(row.error_message());
                    continue;
                }
            };
            match write_row(&mut *store, plan, &coerced) {
                Ok(UpsertTag::Created) => created += 1,
                Ok(UpsertTag::Updated) => updated += 1,
                Err(err) => {
                    let message = format!("row {line} ({}): {err}", describe_key(plan, &row));
                    warn!("{message}");
                    errors.push(message);
                }
            }
        }

        if let Err(err) = store.commit() {
            error!("Commit failed: {err}");
            if let Err(rollback_err) = store.rollback() {
                warn!("Rollback after failed commit also failed: {rollback_err}");
            }
            errors.push(format!("commit failed: {err}"));
            return ImportOutcome::failed(
                FailureClass::Storage,
                "the import could not be saved",
                errors,
            );
        }

        finalize(created, updated, errors, &self.schema.label(plan.data_type()))
    }
}

fn write_row<R>(
    store: &mut R,
    plan: &CoercionPlan,
    record: &CoercedRecord,
) -> Result<UpsertTag, StoreError>
where
    R: RecordStore + ?Sized,
{
    store.savepoint()?;
    match upsert(&mut *store, plan, record) {
        Ok(tag) => {
            store.release_savepoint()?;
            Ok(tag)
        }
        Err(err) => {
            if let Err(rollback_err) = store.rollback_to_savepoint() {
                warn!("Savepoint rollback failed: {rollback_err}");
            }
            Err(err)
        }
    }
}

fn describe_key(plan: &CoercionPlan, row: &ImportRow) -> String {
    plan.key_fields()
        .map(|f| format!("{}: {}", f.csv_header, row.cell(&f.csv_header).trim()))
        .join(", ")
}

pub fn finalize(
    created: usize,
    updated: usize,
    errors: Vec<String>,
    label: &str,
) -> ImportOutcome {
    let mut parts = Vec::new();
    if created > 0 {
        parts.push(format!("{created} {label} record(s) created."));
    }
    if updated > 0 {
        parts.push(format!("{updated} {label} record(s) updated."));
    }
    let summary = if parts.is_empty() {
        "no valid data rows in the file".to_string()
    } else {
        parts.join(" ")
    };

    let (status, message, failure) = if errors.is_empty() {
        (ImportStatus::Success, summary, None)
    } else if created + updated > 0 {
        (ImportStatus::PartialSuccess, summary, None)
    } else {
        (
            ImportStatus::Error,
            "errors occurred while processing the file; see the error list".to_string(),
            Some(FailureClass::Structural),
        )
    };
    ImportOutcome {
        status,
        message,
        created_count: created,
        updated_count: updated,
        errors,
        failure,
    }
}
