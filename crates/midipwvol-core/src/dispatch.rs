// ── Event dispatch ──
//
// Two feeder tasks (monitor, input) push tagged items into one bounded
// queue; a single consumer applies state changes to the mirror and hands
// input events to the handler. A handler error stops the loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{DispatchError, HandlerError, InputError, MonitorError};
use crate::input::{InputEvent, InputSource};
use crate::monitor::{DiffBatch, MonitorItem, MonitorProcess};
use crate::store::Mirror;

/// Capacity of the dispatch queue.
pub const DISPATCH_QUEUE_SIZE: usize = 256;

/// One unit of work for the dispatch loop.
#[derive(Debug)]
pub enum DispatchItem {
    Reset,
    Batch(DiffBatch),
    Input(InputEvent),
}

impl From<MonitorItem> for DispatchItem {
    fn from(item: MonitorItem) -> Self {
        match item {
            MonitorItem::Reset => Self::Reset,
            MonitorItem::Batch(batch) => Self::Batch(batch),
        }
    }
}

/// Create the multi-producer queue shared by the feeders and the dispatcher.
pub fn dispatch_queue() -> (mpsc::Sender<DispatchItem>, mpsc::Receiver<DispatchItem>) {
    mpsc::channel(DISPATCH_QUEUE_SIZE)
}

/// Application logic reacting to input events.
///
/// The mirror is passed in on every call; handlers query it and may
/// enqueue control requests, but never mutate it.
pub trait InputHandler: Send {
    fn handle(&mut self, mirror: &Mirror, event: &InputEvent) -> Result<(), HandlerError>;
}

impl<F> InputHandler for F
where
    F: FnMut(&Mirror, &InputEvent) -> Result<(), HandlerError> + Send,
{
    fn handle(&mut self, mirror: &Mirror, event: &InputEvent) -> Result<(), HandlerError> {
        self(mirror, event)
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────

/// The single consumer of the dispatch queue.
pub struct Dispatcher<H> {
    mirror: Arc<Mirror>,
    handler: H,
    rx: mpsc::Receiver<DispatchItem>,
}

impl<H: InputHandler> Dispatcher<H> {
    pub fn new(mirror: Arc<Mirror>, handler: H, rx: mpsc::Receiver<DispatchItem>) -> Self {
        Self {
            mirror,
            handler,
            rx,
        }
    }

    pub fn mirror(&self) -> &Arc<Mirror> {
        &self.mirror
    }

    /// Route one item.
    pub fn dispatch(&mut self, item: DispatchItem) -> Result<(), DispatchError> {
        match item {
            DispatchItem::Reset => self.mirror.apply_reset(),
            DispatchItem::Batch(batch) => self.mirror.apply_batch(batch),
            DispatchItem::Input(event) => {
                self.handler.handle(&self.mirror, &event).map_err(|e| {
                    error!(error = %e, port = %event.port, "input handler failed");
                    DispatchError::Handler(e)
                })?;
            }
        }
        Ok(())
    }

    /// Drain the queue until cancelled, a handler fails, or every sender is gone.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), DispatchError> {
        info!("dispatch loop started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("dispatch loop cancelled");
                    return Ok(());
                }
                item = self.rx.recv() => {
                    let Some(item) = item else {
                        return Err(DispatchError::QueueClosed);
                    };
                    self.dispatch(item)?;
                }
            }
        }
    }
}

// ── Feeders ──────────────────────────────────────────────────────────

/// Drive the monitor and forward everything it produces.
///
/// Returns `Ok` on cancellation or when the dispatcher has gone away.
/// Stream errors are fatal and returned.
pub async fn monitor_feeder(
    mut monitor: MonitorProcess,
    tx: mpsc::Sender<DispatchItem>,
    cancel: CancellationToken,
) -> Result<(), MonitorError> {
    let result = loop {
        let items = tokio::select! {
            biased;
            () = cancel.cancelled() => break Ok(()),
            items = monitor.next_batch(None) => items,
        };

        let items = match items {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "fatal monitor stream error");
                break Err(e);
            }
        };

        let mut closed = false;
        for item in items {
            if tx.send(item.into()).await.is_err() {
                closed = true;
                break;
            }
        }
        if closed {
            debug!("dispatch queue closed, stopping monitor feeder");
            break Ok(());
        }
    };

    monitor.terminate().await;
    result
}

/// Forward input events until the source is exhausted or cancelled.
pub async fn input_feeder<S: InputSource>(
    mut source: S,
    tx: mpsc::Sender<DispatchItem>,
    cancel: CancellationToken,
) -> Result<(), InputError> {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            event = source.next_event() => event?,
        };

        let Some(event) = event else {
            info!("input source exhausted");
            return Ok(());
        };
        if tx.send(DispatchItem::Input(event)).await.is_err() {
            debug!("dispatch queue closed, stopping input feeder");
            return Ok(());
        }
    }
}
