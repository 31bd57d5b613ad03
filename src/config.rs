//! YAML import configuration.
//!
//! One file declares every importable data type: its label, the fields of
//! the target record and the CSV column mappings. The loaded
//! [`ImportConfig`] serves as both the [`MappingRegistry`] and the
//! [`SchemaDescriptor`] for an import.
//!
//! ```yaml
//! data_types:
//!   item:
//!     label: 品番
//!     fields:
//!       - { name: code, kind: text, unique: true, max_length: 50 }
//!       - { name: unit, kind: text, default: 個 }
//!     mappings:
//!       - { csv_header: 品番, target_field: code, order: 1, is_update_key: true }
//!       - { csv_header: 単位, target_field: unit, order: 2 }
//! ```

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    coerce::CoercionPlan,
    error::ImportError,
    mapping::{ColumnMapping, MappingRegistry, MappingSnapshot, sort_active},
    schema::{FieldSpec, SchemaDescriptor},
    yaml_provider,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataTypeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub mappings: Vec<ColumnMapping>,
}

impl DataTypeConfig {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default)]
    pub data_types: BTreeMap<String, DataTypeConfig>,
}

impl ImportConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: ImportConfig = yaml_provider::load_from_path(path)
            .with_context(|| format!("Loading import configuration from {path:?}"))?;
        debug!(
            "Loaded {} data type(s) from {:?}",
            config.data_types.len(),
            path
        );
        Ok(config)
    }

    pub fn with_data_type(mut self, name: impl Into<String>, config: DataTypeConfig) -> Self {
        self.data_types.insert(name.into(), config);
        self
    }

    pub fn data_type(&self, name: &str) -> Result<&DataTypeConfig, ImportError> {
        self.data_types
            .get(name)
            .ok_or_else(|| ImportError::UnknownDataType(name.to_string()))
    }

    /// Resolves every data type exactly as an import would, reporting the
    /// first broken one.
    pub fn validate(&self) -> Result<(), ImportError> {
        for name in self.data_types.keys() {
            let snapshot = MappingSnapshot::take(self, name)?;
            CoercionPlan::resolve(&snapshot, self)?;
        }
        Ok(())
    }
}

impl MappingRegistry for ImportConfig {
    fn active_mappings(&self, data_type: &str) -> Result<Vec<ColumnMapping>, ImportError> {
        Ok(sort_active(&self.data_type(data_type)?.mappings))
    }
}

impl SchemaDescriptor for ImportConfig {
    fn field(&self, data_type: &str, field: &str) -> Result<&FieldSpec, ImportError> {
        self.data_type(data_type)?
            .field(field)
            .ok_or_else(|| ImportError::UnknownField {
                data_type: data_type.to_string(),
                field: field.to_string(),
            })
    }

    fn label(&self, data_type: &str) -> String {
        self.data_types
            .get(data_type)
            .and_then(|c| c.label.clone())
            .unwrap_or_else(|| data_type.to_string())
    }
}
