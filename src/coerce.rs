//! Row coercion: raw CSV cells into typed field values.
//!
//! [`CoercionPlan::resolve`] joins the mapping snapshot with the schema
//! descriptor once per import. [`coerce_row`] then applies the plan to each
//! [`ImportRow`], collecting every field error of the row before rejecting
//! it so an operator can fix all problems in one pass.
//!
//! Blank cells become absent values (`None`) for every kind. The exception
//! is an update-key field, where a blank cell is an error, and a field the
//! schema marks `required`. Non-blank cells of a field with `choices` must
//! match one of them exactly.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::{
    data::{Value, parse_boolean, parse_integer, parse_naive_date, parse_naive_datetime},
    error::ImportError,
    mapping::MappingSnapshot,
    schema::{FieldKind, SchemaDescriptor},
};

/// Non-null values keyed by target field.
pub type FieldValues = BTreeMap<String, Value>;

/// Coerced row keyed by target field; `None` marks an absent value.
pub type CoercedRecord = BTreeMap<String, Option<Value>>;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldPlan {
    pub csv_header: String,
    pub target_field: String,
    pub kind: FieldKind,
    pub is_update_key: bool,
    pub required: bool,
    pub default: Option<Value>,
    pub choices: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CoercionPlan {
    data_type: String,
    fields: Vec<FieldPlan>,
}

impl CoercionPlan {
    pub fn resolve<S>(snapshot: &MappingSnapshot, schema: &S) -> Result<Self, ImportError>
    where
        S: SchemaDescriptor + ?Sized,
    {
        let data_type = snapshot.data_type();
        let mut fields = Vec::with_capacity(snapshot.mappings().len());
        for mapping in snapshot.mappings() {
            let spec = schema.field(data_type, &mapping.target_field)?;
            let default = match &spec.default {
                Some(raw) => {
                    let invalid = |reason: String| ImportError::InvalidDefault {
                        field: spec.name.clone(),
                        value: raw.clone(),
                        reason,
                    };
                    if !spec.allows(raw.trim()) {
                        return Err(invalid(format!(
                            "not one of {}",
                            spec.choices.join(", ")
                        )));
                    }
                    Some(coerce_text(spec.kind, raw.trim()).map_err(|err| invalid(err.to_string()))?)
                }
                None => None,
            };
            fields.push(FieldPlan {
                csv_header: mapping.csv_header.clone(),
                target_field: mapping.target_field.clone(),
                kind: spec.kind,
                is_update_key: mapping.is_update_key,
                required: spec.required,
                default,
                choices: spec.choices.clone(),
            });
        }
        Ok(Self {
            data_type: data_type.to_string(),
            fields,
        })
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn fields(&self) -> &[FieldPlan] {
        &self.fields
    }

    /// Expected header row, in mapping order.
    pub fn headers(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.csv_header.clone()).collect()
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &FieldPlan> {
        self.fields.iter().filter(|f| f.is_update_key)
    }

    pub fn field(&self, target_field: &str) -> Option<&FieldPlan> {
        self.fields.iter().find(|f| f.target_field == target_field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    /// 1-based file line; the header is line 1.
    pub line: usize,
    pub cells: BTreeMap<String, String>,
    pub errors: Vec<String>,
}

impl ImportRow {
    pub fn from_record(line: usize, headers: &[String], record: &csv::StringRecord) -> Self {
        let cells = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.clone(), cell.to_string()))
            .collect();
        Self {
            line,
            cells,
            errors: Vec::new(),
        }
    }

    pub fn cell(&self, header: &str) -> &str {
        self.cells.get(header).map(String::as_str).unwrap_or("")
    }

    pub fn error_message(&self) -> String {
        format!("row {}: {}", self.line, self.errors.join("; "))
    }
}

pub fn coerce_text(kind: FieldKind, text: &str) -> Result<Value> {
    Ok(match kind {
        FieldKind::Text => Value::Text(text.to_string()),
        FieldKind::Integer => Value::Integer(parse_integer(text)?),
        FieldKind::Boolean => Value::Boolean(parse_boolean(text)),
        FieldKind::Date => Value::Date(parse_naive_date(text)?),
        FieldKind::DateTime => Value::DateTime(parse_naive_datetime(text)?),
    })
}

fn coerce_cell(field: &FieldPlan, raw: &str) -> Result<Option<Value>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        if field.is_update_key {
            return Err(format!("update key '{}' is missing", field.csv_header));
        }
        if field.required {
            return Err(format!("'{}' is required", field.csv_header));
        }
        return Ok(None);
    }
    if !field.choices.is_empty() && !field.choices.iter().any(|c| c == trimmed) {
        return Err(format!(
            "{} [{}]: '{trimmed}' is not an allowed value (allowed: {})",
            field.csv_header,
            field.target_field,
            field.choices.join(", ")
        ));
    }
    coerce_text(field.kind, trimmed)
        .map(Some)
        .map_err(|err| format!("{} [{}]: {err}", field.csv_header, field.target_field))
}

/// Coerces every planned field of `row`. On failure all field errors of the
/// row are returned, in mapping order.
pub fn coerce_row(plan: &CoercionPlan, row: &ImportRow) -> Result<CoercedRecord, Vec<String>> {
    let mut record = CoercedRecord::new();
    let mut errors = Vec::new();
    for field in plan.fields() {
        match coerce_cell(field, row.cell(&field.csv_header)) {
            Ok(value) => {
                record.insert(field.target_field.clone(), value);
            }
            Err(message) => errors.push(message),
        }
    }
    if errors.is_empty() {
        Ok(record)
    } else {
        Err(errors)
    }
}
