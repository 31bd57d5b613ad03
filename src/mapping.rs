//! Column mappings between CSV headers and target fields.
//!
//! A [`MappingRegistry`] resolves a data type to its active mappings. The
//! engine works on a [`MappingSnapshot`], which is taken once per import,
//! validated up front and never re-read while rows are processed.

use std::collections::HashSet;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::ImportError;

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMapping {
    pub csv_header: String,
    pub target_field: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub is_update_key: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl ColumnMapping {
    pub fn new(csv_header: impl Into<String>, target_field: impl Into<String>, order: u32) -> Self {
        Self {
            csv_header: csv_header.into(),
            target_field: target_field.into(),
            order,
            is_update_key: false,
            is_active: true,
        }
    }

    pub fn update_key(mut self) -> Self {
        self.is_update_key = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

pub trait MappingRegistry {
    /// Active mappings for `data_type`, sorted by `(order, csv_header)`.
    fn active_mappings(&self, data_type: &str) -> Result<Vec<ColumnMapping>, ImportError>;
}

/// Keeps active mappings only and orders them by `(order, csv_header)`.
pub fn sort_active(mappings: &[ColumnMapping]) -> Vec<ColumnMapping> {
    mappings
        .iter()
        .filter(|m| m.is_active)
        .sorted_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.csv_header.cmp(&b.csv_header))
        })
        .cloned()
        .collect()
}

/// Immutable, validated view of one data type's active mappings.
#[derive(Debug, Clone)]
pub struct MappingSnapshot {
    data_type: String,
    mappings: Vec<ColumnMapping>,
}

impl MappingSnapshot {
    pub fn take<R>(registry: &R, data_type: &str) -> Result<Self, ImportError>
    where
        R: MappingRegistry + ?Sized,
    {
        let mappings = registry.active_mappings(data_type)?;
        Self::new(data_type, mappings)
    }

    pub fn new(data_type: &str, mappings: Vec<ColumnMapping>) -> Result<Self, ImportError> {
        let mappings = sort_active(&mappings);
        let mut headers = HashSet::new();
        let mut fields = HashSet::new();
        for mapping in &mappings {
            if !headers.insert(mapping.csv_header.as_str()) {
                return Err(ImportError::DuplicateHeader {
                    data_type: data_type.to_string(),
                    header: mapping.csv_header.clone(),
                });
            }
            if !fields.insert(mapping.target_field.as_str()) {
                return Err(ImportError::DuplicateField {
                    data_type: data_type.to_string(),
                    field: mapping.target_field.clone(),
                });
            }
        }
        if !mappings.iter().any(|m| m.is_update_key) {
            return Err(ImportError::NoUpdateKey(data_type.to_string()));
        }
        Ok(Self {
            data_type: data_type.to_string(),
            mappings,
        })
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn mappings(&self) -> &[ColumnMapping] {
        &self.mappings
    }

    pub fn headers(&self) -> Vec<String> {
        self.mappings.iter().map(|m| m.csv_header.clone()).collect()
    }
}
