// ── Diff application ──
//
// Mutations reach the mirror only through here, driven by the dispatch
// loop. The write lock is taken once per reset or batch.

use std::sync::Arc;

use tracing::{debug, info, trace};

use super::Mirror;
use crate::monitor::{DiffBatch, DiffOp};

impl Mirror {
    /// Drop every object. A fresh full picture follows from the monitor.
    pub fn apply_reset(&self) {
        let dropped = {
            let mut table = self.table.write();
            let dropped = table.len();
            table.clear();
            dropped
        };
        self.mark_updated();
        info!(dropped, "mirror reset");
    }

    /// Apply every op of `batch` in order, atomically with respect to readers.
    ///
    /// Removing an id that is not present is a no-op.
    pub fn apply_batch(&self, batch: DiffBatch) {
        let records = batch.len();
        let (upserts, removals, size) = {
            let mut table = self.table.write();
            let mut upserts = 0_usize;
            let mut removals = 0_usize;

            for op in batch.into_ops() {
                match op {
                    DiffOp::Upsert(obj) => {
                        trace!(id = %obj.id(), kind = obj.kind(), "upsert");
                        table.insert(obj.id(), Arc::new(obj));
                        upserts += 1;
                    }
                    DiffOp::Remove(id) => {
                        if table.remove(&id).is_some() {
                            trace!(%id, "remove");
                            removals += 1;
                        } else {
                            trace!(%id, "remove of unknown id ignored");
                        }
                    }
                }
            }
            (upserts, removals, table.len())
        };

        self.mark_updated();
        debug!(records, upserts, removals, size, "batch applied");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;
    use crate::model::ObjectId;

    fn batch(value: Value) -> DiffBatch {
        DiffBatch::from_value(value).unwrap()
    }

    fn ids(mirror: &Mirror) -> Vec<u32> {
        mirror.scan_all().map(|obj| obj.id().get()).collect()
    }

    fn descriptions(mirror: &Mirror) -> Vec<(u32, String)> {
        mirror
            .scan_all()
            .map(|obj| (obj.id().get(), obj.prop_str("node.description").to_owned()))
            .collect()
    }

    fn node(id: u32, description: &str) -> Value {
        json!({
            "id": id,
            "type": "PipeWire:Interface:Node",
            "info": { "props": { "node.description": description } }
        })
    }

    #[test]
    fn upsert_then_remove() {
        let mirror = Mirror::new();
        mirror.apply_batch(batch(json!([node(5, "Speakers"), node(7, "Headset")])));
        assert_eq!(ids(&mirror), vec![5, 7]);

        mirror.apply_batch(batch(json!([{ "id": 5, "info": null }])));
        assert_eq!(ids(&mirror), vec![7]);
        assert!(mirror.get_by_id(ObjectId::new(5)).is_none());
    }

    #[test]
    fn later_op_for_same_id_wins_within_batch() {
        let mirror = Mirror::new();
        mirror.apply_batch(batch(json!([
            node(3, "first"),
            { "id": 3, "info": {} },
            node(3, "second"),
            node(4, "keep"),
            { "id": 4 },
        ])));
        assert_eq!(descriptions(&mirror), vec![(3, "second".to_owned())]);
    }

    #[test]
    fn two_batches_equal_one_overlaid_batch() {
        let first = json!([node(1, "a"), node(2, "b")]);
        let second = json!([node(2, "b2"), { "id": 1, "info": null }, node(9, "c")]);

        let split = Mirror::new();
        split.apply_batch(batch(first.clone()));
        split.apply_batch(batch(second.clone()));

        let mut combined_records = first.as_array().unwrap().clone();
        combined_records.extend(second.as_array().unwrap().iter().cloned());
        let combined = Mirror::new();
        combined.apply_batch(batch(Value::Array(combined_records)));

        assert_eq!(descriptions(&split), descriptions(&combined));
    }

    #[test]
    fn removing_unknown_id_is_a_no_op() {
        let mirror = Mirror::new();
        mirror.apply_batch(batch(json!([node(1, "a")])));
        mirror.apply_batch(batch(json!([{ "id": 42, "info": null }])));
        assert_eq!(ids(&mirror), vec![1]);
    }

    #[test]
    fn reset_empties_the_mirror() {
        let mirror = Mirror::new();
        mirror.apply_batch(batch(json!([node(1, "a"), node(2, "b")])));
        mirror.apply_reset();
        assert!(mirror.is_empty());
        assert_eq!(mirror.scan_all().count(), 0);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_updates() {
        let mirror = Mirror::new();
        mirror.apply_batch(batch(json!([node(1, "a")])));
        let snapshot = mirror.scan_all();

        mirror.apply_reset();
        assert_eq!(snapshot.map(|obj| obj.id().get()).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn batch_lookup_skips_unknown_ids() {
        let mirror = Mirror::new();
        mirror.apply_batch(batch(json!([node(1, "a"), node(2, "b")])));
        let found = mirror.get_by_ids(&[ObjectId::new(2), ObjectId::new(8), ObjectId::new(1)]);
        assert_eq!(
            found.iter().map(|obj| obj.id().get()).collect::<Vec<_>>(),
            vec![2, 1]
        );
    }

    #[test]
    fn readers_never_see_half_a_batch() {
        const RECORDS: u32 = 16;
        const BATCHES: u32 = 200;

        let mirror = Mirror::new();
        let generation = |n: u32| {
            let records: Vec<Value> = (1..=RECORDS).map(|id| node(id, &format!("gen{n}"))).collect();
            batch(Value::Array(records))
        };

        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                let expected = usize::try_from(RECORDS).unwrap();
                while mirror.revision() < u64::from(BATCHES) {
                    let seen = descriptions(&mirror);
                    if seen.is_empty() {
                        continue;
                    }
                    assert_eq!(seen.len(), expected, "partial batch: {seen:?}");
                    let first = &seen[0].1;
                    assert!(
                        seen.iter().all(|(_, description)| description == first),
                        "mixed generations: {seen:?}"
                    );
                }
            });

            for n in 1..=BATCHES {
                mirror.apply_batch(generation(n));
            }
            reader.join().unwrap();
        });

        assert_eq!(mirror.revision(), u64::from(BATCHES));
        assert_eq!(descriptions(&mirror)[0].1, format!("gen{BATCHES}"));
    }

    #[test]
    fn last_update_is_recorded_without_subscribers() {
        let mirror = Mirror::new();
        assert!(mirror.last_update().is_none());

        mirror.apply_batch(batch(json!([node(1, "a")])));
        assert_eq!(mirror.revision(), 1);
        assert!(mirror.last_update().is_some());
    }

    #[test]
    fn every_update_bumps_revision() {
        let mirror = Mirror::new();
        let rx = mirror.subscribe_revision();
        mirror.apply_batch(batch(json!([node(1, "a")])));
        mirror.apply_reset();
        assert_eq!(*rx.borrow(), 2);
        assert!(mirror.last_update().is_some());
    }
}
