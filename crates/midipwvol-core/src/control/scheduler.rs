// ── Coalescing scheduler ──
//
// Requests merge into a pending map (last value wins per target and
// field). A worker task waits for a quiet window after the latest request,
// swaps the map out under the lock, and issues the calls with the lock
// released. One scheduler instance is one control channel.
//
//   Idle ──request──▶ Armed ──quiet window──▶ Flushing ──▶ Idle
//                      ▲  │
//                      └──┘ request re-arms

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast, watch};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ControlSurface;
use crate::error::ControlError;
use crate::model::Level;

const REPORT_CHANNEL_SIZE: usize = 16;

type PendingMap<S> =
    BTreeMap<<S as ControlSurface>::Target, BTreeMap<<S as ControlSurface>::Field, Level>>;

/// Observable phase of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed { deadline: Instant },
    Flushing,
}

/// Result of one call within a flush.
#[derive(Debug, Clone)]
pub struct CallOutcome<T, F> {
    pub target: T,
    pub field: F,
    pub level: Level,
    pub result: Result<(), ControlError>,
}

/// Everything one flush did, in issue order.
#[derive(Debug, Clone)]
pub struct FlushReport<T, F> {
    pub calls: Vec<CallOutcome<T, F>>,
}

impl<T, F> FlushReport<T, F> {
    pub fn failures(&self) -> impl Iterator<Item = &CallOutcome<T, F>> {
        self.calls.iter().filter(|c| c.result.is_err())
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

struct Shared<S: ControlSurface> {
    surface: S,
    debounce: Duration,
    pending: Mutex<PendingMap<S>>,
    wake: Notify,
    state: watch::Sender<SchedulerState>,
    reports: broadcast::Sender<Arc<FlushReport<S::Target, S::Field>>>,
}

/// Debounced, coalescing front-end for a [`ControlSurface`].
///
/// Dropping the scheduler stops its worker; anything still pending is
/// discarded.
pub struct CoalescingScheduler<S: ControlSurface> {
    shared: Arc<Shared<S>>,
    cancel: CancellationToken,
}

impl<S: ControlSurface> CoalescingScheduler<S> {
    /// Start the worker task on the current runtime.
    pub fn spawn(surface: S, debounce: Duration) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_SIZE);
        let shared = Arc::new(Shared {
            surface,
            debounce,
            pending: Mutex::new(BTreeMap::new()),
            wake: Notify::new(),
            state,
            reports,
        });
        let cancel = CancellationToken::new();

        tokio::spawn(worker(Arc::clone(&shared), cancel.clone()));

        Self { shared, cancel }
    }

    pub fn surface(&self) -> &S {
        &self.shared.surface
    }

    /// Queue a value for `field` of `target`, replacing any pending value
    /// for the same pair, and restart the quiet window.
    pub fn request(&self, target: S::Target, field: S::Field, level: Level) {
        self.request_many(target, [(field, level)]);
    }

    /// Queue several fields of one target at once.
    pub fn request_many<I>(&self, target: S::Target, fields: I)
    where
        I: IntoIterator<Item = (S::Field, Level)>,
    {
        {
            let mut pending = self.shared.pending.lock();
            let entry = pending.entry(target).or_default();
            for (field, level) in fields {
                entry.insert(field, level);
            }
        }
        self.shared.wake.notify_one();
    }

    /// Number of (target, field) pairs waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().values().map(BTreeMap::len).sum()
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.shared.state.subscribe()
    }

    /// Receive a report after every non-empty flush.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<FlushReport<S::Target, S::Field>>> {
        self.shared.reports.subscribe()
    }

    /// Flush immediately, bypassing the quiet window.
    pub async fn flush_now(&self) -> FlushReport<S::Target, S::Field> {
        flush(&self.shared).await
    }

    /// Stop the worker, wait for a flush it has in flight, then send
    /// whatever is still pending.
    pub async fn close(&self) -> FlushReport<S::Target, S::Field> {
        self.cancel.cancel();
        let mut state = self.shared.state.subscribe();
        // Err only if the sender is gone, which `shared` rules out.
        let _ = state
            .wait_for(|s| !matches!(s, SchedulerState::Flushing))
            .await;
        flush(&self.shared).await
    }
}

impl<S: ControlSurface> Drop for CoalescingScheduler<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<S: ControlSurface> std::fmt::Debug for CoalescingScheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingScheduler")
            .field("surface", &self.shared.surface.name())
            .field("debounce", &self.shared.debounce)
            .field("state", &self.state())
            .field("pending", &self.pending_len())
            .finish()
    }
}

// ── Worker ───────────────────────────────────────────────────────────

async fn worker<S: ControlSurface>(shared: Arc<Shared<S>>, cancel: CancellationToken) {
    loop {
        shared.state.send_replace(SchedulerState::Idle);
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = shared.wake.notified() => {}
        }

        let mut deadline = Instant::now() + shared.debounce;
        shared.state.send_replace(SchedulerState::Armed { deadline });
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = shared.wake.notified() => {
                    deadline = Instant::now() + shared.debounce;
                    shared.state.send_replace(SchedulerState::Armed { deadline });
                }
                () = sleep_until(deadline) => break,
            }
        }

        shared.state.send_replace(SchedulerState::Flushing);
        let report = flush(&shared).await;
        if !report.is_empty() {
            let _ = shared.reports.send(Arc::new(report));
        }
    }
}

/// Swap out the pending map and issue one call per (target, field).
async fn flush<S: ControlSurface>(shared: &Shared<S>) -> FlushReport<S::Target, S::Field> {
    let batch = std::mem::take(&mut *shared.pending.lock());
    let mut calls = Vec::new();

    for (target, fields) in batch {
        for (field, level) in fields {
            let value = shared.surface.scale(&target, field, level);
            let result = shared.surface.send(&target, field, value).await;
            if let Err(e) = &result {
                warn!(
                    surface = shared.surface.name(),
                    %target,
                    %field,
                    status = ?e.status(),
                    error = %e,
                    "control call failed"
                );
            }
            calls.push(CallOutcome {
                target: target.clone(),
                field,
                level,
                result,
            });
        }
    }

    if !calls.is_empty() {
        debug!(
            surface = shared.surface.name(),
            calls = calls.len(),
            failed = calls.iter().filter(|c| c.result.is_err()).count(),
            "flush complete"
        );
    }
    FlushReport { calls }
}
