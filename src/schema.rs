//! Declarative description of the target records an import writes to.
//!
//! A [`SchemaDescriptor`] answers, for a data type, which fields exist and
//! how raw text must be coerced into each of them ([`FieldKind`]). The
//! descriptor is consulted once per import when the
//! [`CoercionPlan`](crate::coerce::CoercionPlan) is resolved, never per row.

use std::{fmt, str::FromStr};

use anyhow::{Result as AnyResult, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::ImportError;

/// Coercion target for a field. Configuration files may use the aliases
/// accepted by [`FromStr`] (`string`, `int`, `bool`, `date_time`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    Date,
    DateTime,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::DateTime => "datetime",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> AnyResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "string" => Ok(FieldKind::Text),
            "integer" | "int" => Ok(FieldKind::Integer),
            "boolean" | "bool" => Ok(FieldKind::Boolean),
            "date" => Ok(FieldKind::Date),
            "datetime" | "date_time" => Ok(FieldKind::DateTime),
            other => Err(anyhow!("Unknown field kind '{other}'")),
        }
    }
}

impl TryFrom<String> for FieldKind {
    type Error = anyhow::Error;

    fn try_from(value: String) -> AnyResult<Self> {
        value.parse()
    }
}

impl From<FieldKind> for String {
    fn from(kind: FieldKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Metadata for one field of a target record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// Raw text coerced with `kind`; used only when a new record is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Allowed cell texts, compared after trimming. Empty means any value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
            unique: false,
            max_length: None,
            choices: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn with_choices<I, T>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn allows(&self, text: &str) -> bool {
        self.choices.is_empty() || self.choices.iter().any(|c| c == text)
    }
}

pub trait SchemaDescriptor {
    /// Looks up a field, failing with [`ImportError::UnknownField`] when the
    /// target schema has no such field.
    fn field(&self, data_type: &str, field: &str) -> Result<&FieldSpec, ImportError>;

    fn field_kind(&self, data_type: &str, field: &str) -> Result<FieldKind, ImportError> {
        self.field(data_type, field).map(|spec| spec.kind)
    }

    /// Human label used in summary messages.
    fn label(&self, data_type: &str) -> String {
        data_type.to_string()
    }
}
