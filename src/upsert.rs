use log::debug;

use crate::{
    coerce::{CoercedRecord, CoercionPlan, FieldValues},
    error::StoreError,
    store::RecordStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertTag {
    Created,
    Updated,
}

/// A coerced record split into update-key values and the remaining
/// non-null values. Absent values are dropped so they never overwrite
/// stored data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partitioned {
    pub key_fields: FieldValues,
    pub other_fields: FieldValues,
}

pub fn partition(plan: &CoercionPlan, record: &CoercedRecord) -> Partitioned {
    let mut parts = Partitioned::default();
    for (field, value) in record {
        let Some(value) = value else {
            continue;
        };
        let is_key = plan.field(field).is_some_and(|f| f.is_update_key);
        let target = if is_key {
            &mut parts.key_fields
        } else {
            &mut parts.other_fields
        };
        target.insert(field.clone(), value.clone());
    }
    parts
}

/// Fills schema defaults for fields the row left blank. Used on create only.
fn with_defaults(plan: &CoercionPlan, parts: &Partitioned) -> FieldValues {
    let mut fields = parts.key_fields.clone();
    fields.extend(parts.other_fields.clone());
    for field in plan.fields() {
        if let Some(default) = &field.default {
            fields
                .entry(field.target_field.clone())
                .or_insert_with(|| default.clone());
        }
    }
    fields
}

pub fn upsert<S>(
    store: &mut S,
    plan: &CoercionPlan,
    record: &CoercedRecord,
) -> Result<UpsertTag, StoreError>
where
    S: RecordStore + ?Sized,
{
    let parts = partition(plan, record);
    if parts.key_fields.is_empty() {
        return Err(StoreError::Unexpected(
            "record has no update-key values".to_string(),
        ));
    }
    let data_type = plan.data_type();
    match store.find_by_key(data_type, &parts.key_fields)? {
        Some(id) => {
            debug!("Updating {data_type} record {id}");
            store.update_record(data_type, id, &parts.other_fields)?;
            Ok(UpsertTag::Updated)
        }
        None => {
            let id = store.create_record(data_type, &with_defaults(plan, &parts))?;
            debug!("Created {data_type} record {id}");
            Ok(UpsertTag::Created)
        }
    }
}
