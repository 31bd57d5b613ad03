#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use mes_csv_import::{
    config::{DataTypeConfig, ImportConfig},
    import::{ImportOutcome, ImportRequest, Importer},
    mapping::ColumnMapping,
    schema::{FieldKind, FieldSpec},
    store::RecordStore,
};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes raw bytes into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file");
        path
    }
}

/// Two text columns, `code` being the update key.
pub fn widget_config() -> ImportConfig {
    ImportConfig::default().with_data_type(
        "widget",
        DataTypeConfig {
            label: Some("widget".into()),
            fields: vec![
                FieldSpec::new("code", FieldKind::Text),
                FieldSpec::new("name", FieldKind::Text),
            ],
            mappings: vec![
                ColumnMapping::new("code", "code", 1).update_key(),
                ColumnMapping::new("name", "name", 2),
            ],
        },
    )
}

/// Item master with one column per field kind.
pub fn item_config() -> ImportConfig {
    ImportConfig::default().with_data_type(
        "item",
        DataTypeConfig {
            label: Some("品番".into()),
            fields: vec![
                FieldSpec::new("code", FieldKind::Text)
                    .unique()
                    .with_max_length(20),
                FieldSpec::new("name", FieldKind::Text),
                FieldSpec::new("quantity", FieldKind::Integer),
                FieldSpec::new("released_on", FieldKind::Date),
                FieldSpec::new("is_active", FieldKind::Boolean),
                FieldSpec::new("unit", FieldKind::Text)
                    .with_choices(["個", "本", "箱", "袋"])
                    .with_default("個"),
            ],
            mappings: vec![
                ColumnMapping::new("品番", "code", 1).update_key(),
                ColumnMapping::new("品名", "name", 2),
                ColumnMapping::new("数量", "quantity", 3),
                ColumnMapping::new("登録日", "released_on", 4),
                ColumnMapping::new("有効", "is_active", 5),
                ColumnMapping::new("単位", "unit", 6),
            ],
        },
    )
}

pub fn run_import<S: RecordStore + ?Sized>(
    config: &ImportConfig,
    store: &mut S,
    data_type: &str,
    contents: &[u8],
) -> ImportOutcome {
    Importer::new(config, config).import(
        store,
        &ImportRequest {
            data_type,
            file_name: "upload.csv",
            contents,
        },
    )
}
