mod common;

use common::{TestWorkspace, item_config, run_import, widget_config};
use encoding_rs::SHIFT_JIS;
use mes_csv_import::{
    coerce::FieldValues,
    config::ImportConfig,
    data::Value,
    error::StoreError,
    import::{FailureClass, ImportRequest, ImportStatus, Importer},
    mapping::ColumnMapping,
    store::{JsonFileStore, MemoryStore, RecordId, RecordStore},
};
use proptest::prelude::*;

const ITEM_HEADER: &str = "品番,品名,数量,登録日,有効,単位\n";

fn item_csv(rows: &[&str]) -> Vec<u8> {
    let mut text = ITEM_HEADER.to_string();
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text.into_bytes()
}

fn item_store(config: &ImportConfig) -> MemoryStore {
    MemoryStore::from_config(config)
}

#[test]
fn well_formed_file_imports_every_row() {
    let config = item_config();
    let mut store = item_store(&config);
    let csv = item_csv(&[
        "A-001,ボルト,100,2024-04-01,はい,個",
        "A-002,ナット,50.0,2024/04/02,false,",
        "A-003,ワッシャー,,,,箱",
    ]);
    let outcome = run_import(&config, &mut store, "item", &csv);

    assert_eq!(outcome.status, ImportStatus::Success);
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.created_count + outcome.updated_count, 3);
    assert_eq!(outcome.message, "3 品番 record(s) created.");
    assert_eq!(outcome.http_status(), 200);

    let a2 = store.find("item", "code", &Value::from("A-002")).unwrap();
    assert_eq!(a2.fields["quantity"], Value::Integer(50));
    assert_eq!(a2.fields["is_active"], Value::Boolean(false));
    assert_eq!(a2.fields["unit"], Value::from("個"));
    let a3 = store.find("item", "code", &Value::from("A-003")).unwrap();
    assert!(!a3.fields.contains_key("quantity"));
    assert_eq!(a3.fields["unit"], Value::from("箱"));
}

#[test]
fn reimporting_the_same_file_only_updates() {
    let config = item_config();
    let mut store = item_store(&config);
    let csv = item_csv(&["A-001,ボルト,100,2024-04-01,yes,個", "A-002,ナット,5,,,"]);

    let first = run_import(&config, &mut store, "item", &csv);
    assert_eq!((first.created_count, first.updated_count), (2, 0));

    let second = run_import(&config, &mut store, "item", &csv);
    assert_eq!(second.status, ImportStatus::Success);
    assert_eq!((second.created_count, second.updated_count), (0, 2));
    assert_eq!(second.message, "2 品番 record(s) updated.");
    assert_eq!(store.records("item").len(), 2);
}

#[test]
fn header_with_missing_or_reordered_columns_is_rejected() {
    let config = item_config();
    let mut store = item_store(&config);

    let missing = "品番,品名,数量,登録日,有効\nA-001,ボルト,1,,\n";
    let outcome = run_import(&config, &mut store, "item", missing.as_bytes());
    assert_eq!(outcome.status, ImportStatus::Error);
    assert_eq!((outcome.created_count, outcome.updated_count), (0, 0));
    assert_eq!(outcome.http_status(), 400);
    assert!(outcome.errors[0].contains("expected: 品番, 品名, 数量, 登録日, 有効, 単位"));

    let reordered = "品名,品番,数量,登録日,有効,単位\nボルト,A-001,1,,,\n";
    let outcome = run_import(&config, &mut store, "item", reordered.as_bytes());
    assert_eq!(outcome.status, ImportStatus::Error);
    assert_eq!(outcome.processed(), 0);
    assert!(store.records("item").is_empty());
}

#[test]
fn blank_update_key_is_one_error_for_that_row() {
    let config = item_config();
    let mut store = item_store(&config);
    let csv = item_csv(&["A-001,ボルト,1,,,", "  ,ナット,2,,,"]);
    let outcome = run_import(&config, &mut store, "item", &csv);

    assert_eq!(outcome.status, ImportStatus::PartialSuccess);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0], "row 3: update key '品番' is missing");
    assert_eq!(store.records("item").len(), 1);
}

#[test]
fn unparseable_cells_name_field_and_raw_text() {
    let config = item_config();
    let mut store = item_store(&config);
    let csv = item_csv(&["A-001,ボルト,十個,2024-02-30,,"]);
    let outcome = run_import(&config, &mut store, "item", &csv);

    assert_eq!(outcome.status, ImportStatus::Error);
    assert_eq!(outcome.processed(), 0);
    assert_eq!(outcome.errors.len(), 1);
    let error = &outcome.errors[0];
    assert!(error.starts_with("row 2: "));
    assert!(error.contains("quantity") && error.contains("'十個'"));
    assert!(error.contains("released_on") && error.contains("'2024-02-30'"));
    assert_eq!(
        outcome.message,
        "errors occurred while processing the file; see the error list"
    );
}

#[test]
fn same_key_rows_create_then_update() {
    let config = widget_config();
    let mut store = MemoryStore::new();

    let first = run_import(&config, &mut store, "widget", b"code,name\nA1,Widget\n");
    assert_eq!((first.created_count, first.updated_count), (1, 0));

    let second = run_import(&config, &mut store, "widget", b"code,name\nA1,WidgetV2\n");
    assert_eq!((second.created_count, second.updated_count), (0, 1));

    let stored = store.find("widget", "code", &Value::from("A1")).unwrap();
    assert_eq!(stored.fields["name"], Value::from("WidgetV2"));

    let mut fresh = MemoryStore::new();
    let combined = run_import(
        &config,
        &mut fresh,
        "widget",
        b"code,name\nA1,Widget\nA1,WidgetV2\n",
    );
    assert_eq!((combined.created_count, combined.updated_count), (1, 1));
    assert_eq!(fresh.records("widget").len(), 1);
}

#[test]
fn invalid_date_in_middle_row_is_partial_success() {
    let config = item_config();
    let mut store = item_store(&config);
    let csv = item_csv(&[
        "A-001,ボルト,1,2024-01-01,,",
        "A-002,ナット,2,2024-99-01,,",
        "A-003,ワッシャー,3,2024/01/03,,",
    ]);
    let outcome = run_import(&config, &mut store, "item", &csv);

    assert_eq!(outcome.status, ImportStatus::PartialSuccess);
    assert_eq!(outcome.processed(), 2);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].starts_with("row 3:"));
    assert_eq!(outcome.http_status(), 207);
}

#[test]
fn undecodable_upload_is_rejected_before_any_row() {
    let config = widget_config();
    let mut store = MemoryStore::new();
    let outcome = run_import(&config, &mut store, "widget", b"code,name\n\xA0\xFD,x\n");

    assert_eq!(outcome.status, ImportStatus::Error);
    assert_eq!(outcome.message, "invalid encoding");
    assert_eq!(outcome.processed(), 0);
    assert!(store.records("widget").is_empty());
    assert!(!store.in_transaction());
}

#[test]
fn shift_jis_upload_imports() {
    let config = item_config();
    let mut store = item_store(&config);
    let (bytes, _, _) = SHIFT_JIS.encode("品番,品名,数量,登録日,有効,単位\r\nB-001,六角ボルト,10,,はい,本\r\n");
    let outcome = run_import(&config, &mut store, "item", &bytes);

    assert_eq!(outcome.status, ImportStatus::Success);
    let record = store.find("item", "code", &Value::from("B-001")).unwrap();
    assert_eq!(record.fields["name"], Value::from("六角ボルト"));
    assert_eq!(record.fields["is_active"], Value::Boolean(true));
}

#[test]
fn utf8_bom_is_ignored_for_header_check() {
    let config = widget_config();
    let mut store = MemoryStore::new();
    let mut bytes = b"\xEF\xBB\xBF".to_vec();
    bytes.extend_from_slice(b"code,name\r\nA1,Widget\r\n");
    let outcome = run_import(&config, &mut store, "widget", &bytes);
    assert_eq!(outcome.status, ImportStatus::Success);
}

#[test]
fn blank_cells_do_not_overwrite_existing_values() {
    let config = item_config();
    let mut store = item_store(&config);
    run_import(&config, &mut store, "item", &item_csv(&["A-001,ボルト,100,2024-04-01,はい,本"]));
    let outcome = run_import(&config, &mut store, "item", &item_csv(&["A-001,,,,,"]));
    assert_eq!(outcome.updated_count, 1);

    let record = store.find("item", "code", &Value::from("A-001")).unwrap();
    assert_eq!(record.fields["name"], Value::from("ボルト"));
    assert_eq!(record.fields["quantity"], Value::Integer(100));
    assert_eq!(record.fields["unit"], Value::from("本"));
}

#[test]
fn constraint_violation_keeps_other_rows() {
    let config = item_config();
    let mut store = item_store(&config);
    let csv = item_csv(&[
        "A-001,ボルト,1,,,",
        "A-000000000000000000002,長すぎる品番,1,,,",
        "A-003,ワッシャー,3,,,",
    ]);
    let outcome = run_import(&config, &mut store, "item", &csv);

    assert_eq!(outcome.status, ImportStatus::PartialSuccess);
    assert_eq!(outcome.created_count, 2);
    assert_eq!(outcome.errors.len(), 1);
    let error = &outcome.errors[0];
    assert!(error.starts_with("row 3 (品番: A-000000000000000000002): constraint violation"));
    assert_eq!(store.records("item").len(), 2);
}

#[test]
fn wrong_column_count_is_a_row_error() {
    let config = widget_config();
    let mut store = MemoryStore::new();
    let outcome = run_import(
        &config,
        &mut store,
        "widget",
        b"code,name\nA1,Widget,extra\nA2,Gadget\n",
    );
    assert_eq!(outcome.status, ImportStatus::PartialSuccess);
    assert_eq!(outcome.errors, vec!["row 2: expected 2 columns, found 3"]);
    assert_eq!(outcome.created_count, 1);
}

#[test]
fn blank_lines_keep_file_line_numbers() {
    let config = widget_config();
    let mut store = MemoryStore::new();
    let outcome = run_import(
        &config,
        &mut store,
        "widget",
        b"code,name\nA1,Widget\n\nA2,Gadget,extra\nA3,Gizmo\n",
    );

    assert_eq!(outcome.status, ImportStatus::PartialSuccess);
    assert_eq!(outcome.created_count, 2);
    assert_eq!(
        outcome.errors,
        vec![
            "row 3: expected 2 columns, found 0",
            "row 4: expected 2 columns, found 3",
        ]
    );
}

#[test]
fn trailing_blank_lines_are_ignored() {
    let config = widget_config();
    let mut store = MemoryStore::new();
    let outcome = run_import(&config, &mut store, "widget", b"code,name\r\nA1,Widget\r\n\r\n\r\n");
    assert_eq!(outcome.status, ImportStatus::Success);
    assert_eq!(outcome.created_count, 1);
}

#[test]
fn value_outside_choices_rejects_the_row() {
    let config = item_config();
    let mut store = item_store(&config);
    let csv = item_csv(&["A-001,ボルト,1,,,ダース", "A-002,ナット,2,,,袋"]);
    let outcome = run_import(&config, &mut store, "item", &csv);

    assert_eq!(outcome.status, ImportStatus::PartialSuccess);
    assert_eq!(
        outcome.errors,
        vec!["row 2: 単位 [unit]: 'ダース' is not an allowed value (allowed: 個, 本, 箱, 袋)"]
    );
    assert!(store.find("item", "code", &Value::from("A-001")).is_none());
}

#[test]
fn full_width_quantities_are_integers() {
    let config = item_config();
    let mut store = item_store(&config);
    let outcome = run_import(&config, &mut store, "item", &item_csv(&["A-001,ボルト,１２０,,,"]));

    assert_eq!(outcome.status, ImportStatus::Success);
    let record = store.find("item", "code", &Value::from("A-001")).unwrap();
    assert_eq!(record.fields["quantity"], Value::Integer(120));
}

#[test]
fn failed_store_write_leaves_nothing_behind() {
    let workspace = TestWorkspace::new();
    let config = widget_config();
    let path = workspace.path().join("missing").join("store.json");
    let mut store = JsonFileStore::open(&path, &config).unwrap();
    let outcome = run_import(&config, &mut store, "widget", b"code,name\nA1,Widget\n");

    assert_eq!(outcome.status, ImportStatus::Error);
    assert_eq!(outcome.failure, Some(FailureClass::Storage));
    assert_eq!(outcome.message, "the import could not be saved");
    assert!(store.memory().records("widget").is_empty());
    assert!(!store.memory().in_transaction());
    assert!(!path.exists());
}

#[test]
fn header_only_and_empty_files() {
    let config = widget_config();
    let mut store = MemoryStore::new();

    let header_only = run_import(&config, &mut store, "widget", b"code,name\n");
    assert_eq!(header_only.status, ImportStatus::Success);
    assert_eq!(header_only.message, "no data rows to import");

    let empty = run_import(&config, &mut store, "widget", b"");
    assert_eq!(empty.status, ImportStatus::Error);
    assert_eq!(empty.message, "the CSV file is empty");
}

#[test]
fn non_csv_file_name_is_rejected() {
    let config = widget_config();
    let mut store = MemoryStore::new();
    let outcome = Importer::new(&config, &config).import(
        &mut store,
        &ImportRequest {
            data_type: "widget",
            file_name: "widgets.xlsx",
            contents: b"code,name\nA1,Widget\n",
        },
    );
    assert_eq!(outcome.status, ImportStatus::Error);
    assert_eq!(outcome.failure, Some(FailureClass::Structural));
    assert!(store.records("widget").is_empty());
}

#[test]
fn broken_mapping_is_a_configuration_failure() {
    let mut config = widget_config();
    config
        .data_types
        .get_mut("widget")
        .unwrap()
        .mappings
        .push(ColumnMapping::new("colour", "colour", 3));
    let mut store = MemoryStore::new();
    let outcome = run_import(&config, &mut store, "widget", b"code,name,colour\nA1,W,red\n");

    assert_eq!(outcome.status, ImportStatus::Error);
    assert_eq!(outcome.failure, Some(FailureClass::Configuration));
    assert_eq!(outcome.http_status(), 500);
    assert!(outcome.errors[0].contains("colour"));

    let unknown = run_import(&config, &mut store, "supplier", b"code\nA1\n");
    assert_eq!(unknown.failure, Some(FailureClass::Configuration));
}

/// Delegates to a [`MemoryStore`] but fails writes for one key value and,
/// optionally, the final commit.
struct FlakyStore {
    inner: MemoryStore,
    fail_on: Value,
    fail_commit: bool,
}

impl FlakyStore {
    fn new(fail_on: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_on: Value::from(fail_on),
            fail_commit: false,
        }
    }
}

impl RecordStore for FlakyStore {
    fn find_by_key(&self, data_type: &str, key: &FieldValues) -> Result<Option<RecordId>, StoreError> {
        self.inner.find_by_key(data_type, key)
    }

    fn create_record(&mut self, data_type: &str, fields: &FieldValues) -> Result<RecordId, StoreError> {
        if fields.values().any(|v| *v == self.fail_on) {
            return Err(StoreError::Unexpected("connection reset".to_string()));
        }
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

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.fail_commit {
            return Err(StoreError::Unexpected("disk full".to_string()));
        }
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.inner.rollback()
    }
}

#[test]
fn unexpected_store_error_is_recorded_and_loop_continues() {
    let config = widget_config();
    let mut store = FlakyStore::new("B2");
    let outcome = run_import(
        &config,
        &mut store,
        "widget",
        b"code,name\nB1,one\nB2,two\nB3,three\n",
    );

    assert_eq!(outcome.status, ImportStatus::PartialSuccess);
    assert_eq!(outcome.created_count, 2);
    assert_eq!(
        outcome.errors,
        vec!["row 3 (code: B2): unexpected store error: connection reset"]
    );
    assert_eq!(store.inner.records("widget").len(), 2);
}

#[test]
fn failed_commit_discards_the_batch() {
    let config = widget_config();
    let mut store = FlakyStore::new("never");
    store.fail_commit = true;
    let outcome = run_import(&config, &mut store, "widget", b"code,name\nB1,one\n");

    assert_eq!(outcome.status, ImportStatus::Error);
    assert_eq!(outcome.failure, Some(FailureClass::Storage));
    assert_eq!(outcome.http_status(), 500);
    assert_eq!(outcome.processed(), 0);
    assert!(store.inner.records("widget").is_empty());
}

proptest! {
    #[test]
    fn reimport_is_idempotent(codes in proptest::collection::btree_set("[A-Z][0-9]{1,4}", 1..20)) {
        let config = widget_config();
        let mut store = MemoryStore::new();
        let mut csv = String::from("code,name\n");
        for code in &codes {
            csv.push_str(&format!("{code},name-{code}\n"));
        }
        let first = run_import(&config, &mut store, "widget", csv.as_bytes());
        prop_assert_eq!(first.status, ImportStatus::Success);
        prop_assert_eq!(first.created_count, codes.len());

        let second = run_import(&config, &mut store, "widget", csv.as_bytes());
        prop_assert_eq!(second.created_count, 0);
        prop_assert_eq!(second.updated_count, codes.len());
        prop_assert_eq!(store.records("widget").len(), codes.len());
    }
}
