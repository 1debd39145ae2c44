// ── Mirror table ──
//
// A single `RwLock`-guarded map. Readers take a point-in-time snapshot of
// the `Arc`s and release the lock before iterating; writers hold the lock
// for a whole batch so no reader ever sees half of one.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::model::{MirroredObject, ObjectId};

/// In-memory replica of the PipeWire object graph.
pub struct Mirror {
    pub(crate) table: RwLock<HashMap<ObjectId, Arc<MirroredObject>>>,
    /// Bumped after every reset or batch.
    pub(crate) revision: watch::Sender<u64>,
    pub(crate) last_update: watch::Sender<Option<DateTime<Utc>>>,
}

impl Mirror {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        let (last_update, _) = watch::channel(None);

        Self {
            table: RwLock::new(HashMap::new()),
            revision,
            last_update,
        }
    }

    // ── Lookups ──────────────────────────────────────────────────

    pub fn get_by_id(&self, id: ObjectId) -> Option<Arc<MirroredObject>> {
        self.table.read_recursive().get(&id).cloned()
    }

    /// Batch lookup. Unknown ids are skipped; order follows `ids`.
    pub fn get_by_ids(&self, ids: &[ObjectId]) -> Vec<Arc<MirroredObject>> {
        let table = self.table.read_recursive();
        ids.iter().filter_map(|id| table.get(id).cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.table.read_recursive().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read_recursive().is_empty()
    }

    /// Point-in-time view of every object, ordered by id.
    ///
    /// The lock is released before the snapshot is returned, so consumers
    /// may take as long as they like and may query the mirror again while
    /// iterating.
    pub fn scan_all(&self) -> MirrorSnapshot {
        let mut objects: Vec<_> = self.table.read_recursive().values().cloned().collect();
        objects.sort_unstable_by_key(|obj| obj.id());
        MirrorSnapshot {
            inner: objects.into_iter(),
        }
    }

    // ── Change notification ──────────────────────────────────────

    /// Subscribe to the mirror revision counter.
    pub fn subscribe_revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.borrow()
    }

    pub(crate) fn mark_updated(&self) {
        self.revision.send_modify(|rev| *rev += 1);
        self.last_update.send_replace(Some(Utc::now()));
    }
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("len", &self.len())
            .field("revision", &self.revision())
            .finish_non_exhaustive()
    }
}

/// Lazy, single-pass sequence of objects captured by [`Mirror::scan_all`].
#[derive(Debug)]
pub struct MirrorSnapshot {
    inner: std::vec::IntoIter<Arc<MirroredObject>>,
}

impl Iterator for MirrorSnapshot {
    type Item = Arc<MirroredObject>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for MirrorSnapshot {}
