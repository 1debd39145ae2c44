// ── Monitor diff records ──
//
// `pw-dump --monitor` writes one JSON array per change set. Each element
// is either a full object (upsert) or `{"id": N, "info": null}` (removal).
// A record without a usable id cannot be applied; it is logged and skipped
// so the rest of its change set still lands.

use serde_json::Value;
use tracing::warn;

use crate::error::MonitorError;
use crate::model::{MirroredObject, ObjectId};

/// One instruction for the mirror.
#[derive(Debug)]
pub enum DiffOp {
    Upsert(MirroredObject),
    Remove(ObjectId),
}

/// An ordered change set. Later ops for the same id win.
#[derive(Debug, Default)]
pub struct DiffBatch {
    ops: Vec<DiffOp>,
}

impl DiffBatch {
    pub fn new(ops: Vec<DiffOp>) -> Self {
        Self { ops }
    }

    /// Decode one value read from the monitor stream.
    ///
    /// Only a non-array value is an error; bad records are dropped.
    pub fn from_value(value: Value) -> Result<Self, MonitorError> {
        let Value::Array(records) = value else {
            return Err(MonitorError::Schema {
                message: format!("expected an array of records, got {}", json_kind(&value)),
            });
        };

        let total = records.len();
        let ops: Vec<_> = records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| {
                decode_record(index, record)
                    .inspect_err(|e| warn!(error = %e, total, "skipping monitor record"))
                    .ok()
            })
            .collect();
        Ok(Self::new(ops))
    }

    pub fn ops(&self) -> &[DiffOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<DiffOp> {
        self.ops
    }
}

fn decode_record(index: usize, record: Value) -> Result<DiffOp, MonitorError> {
    let id = record
        .get("id")
        .and_then(Value::as_u64)
        .and_then(|raw| u32::try_from(raw).ok())
        .map(ObjectId::new)
        .ok_or_else(|| MonitorError::Schema {
            message: format!("record {index} has no valid unsigned 32-bit `id`"),
        })?;

    if carries_details(&record) {
        Ok(DiffOp::Upsert(MirroredObject::from_record(id, record)))
    } else {
        Ok(DiffOp::Remove(id))
    }
}

/// A record without `info`, with `info: null`, or with an empty `info`
/// object announces that the object is gone.
fn carries_details(record: &Value) -> bool {
    match record.get("info") {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_upserts_and_removals_in_order() {
        let batch = DiffBatch::from_value(json!([
            { "id": 5, "type": "PipeWire:Interface:Node", "info": { "props": {} } },
            { "id": 6, "info": null },
            { "id": 7 },
            { "id": 8, "info": {} },
        ]))
        .unwrap();

        let ops = batch.ops();
        assert_eq!(ops.len(), 4);
        assert!(matches!(&ops[0], DiffOp::Upsert(obj) if obj.id() == ObjectId::new(5)));
        assert!(matches!(ops[1], DiffOp::Remove(id) if id == ObjectId::new(6)));
        assert!(matches!(ops[2], DiffOp::Remove(id) if id == ObjectId::new(7)));
        assert!(matches!(ops[3], DiffOp::Remove(id) if id == ObjectId::new(8)));
    }

    #[test]
    fn non_array_value_is_a_schema_error() {
        let err = DiffBatch::from_value(json!({ "id": 1 })).unwrap_err();
        assert!(err.to_string().contains("an object"));
    }

    #[test]
    fn records_without_valid_id_are_skipped() {
        let batch = DiffBatch::from_value(json!([
            { "info": { "props": {} } },
            { "id": 3, "info": { "props": {} } },
            { "id": -4 },
            { "id": "7", "info": null },
        ]))
        .unwrap();

        assert_eq!(batch.len(), 1);
        assert!(matches!(&batch.ops()[0], DiffOp::Upsert(obj) if obj.id() == ObjectId::new(3)));
    }

    #[test]
    fn empty_array_is_an_empty_batch() {
        assert!(DiffBatch::from_value(json!([])).unwrap().is_empty());
    }
}
