//! Supervision of the `pw-dump --monitor` subprocess.
//!
//! [`MonitorProcess`] owns the child and its stdout pipe. It launches the
//! child lazily, relaunches it whenever it exits, and turns the pipe into
//! a sequence of [`MonitorItem`]s. Every (re)launch is announced with a
//! single [`MonitorItem::Reset`] before any data from the new process.
//!
//! Two ways to consume it:
//!
//! - [`MonitorProcess::try_next`] never waits for the pipe: it reads what
//!   is already there and returns at most one item.
//! - [`MonitorProcess::next_batch`] waits until something is readable
//!   (optionally bounded by a timeout) and returns every item available.

mod diff;
mod framer;

use std::process::Stdio;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::MonitorError;

pub use diff::{DiffBatch, DiffOp};
pub use framer::{DEFAULT_BUFFER_CEILING, StreamFramer};

/// Size of a single read from the monitor pipe.
const READ_CHUNK: usize = 64 * 1024;

/// Grace period for the child to exit after being killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// One unit produced by the monitor.
#[derive(Debug)]
pub enum MonitorItem {
    /// The monitor was (re)started; all previously mirrored state is stale.
    Reset,
    /// A decoded change set.
    Batch(DiffBatch),
}

/// A supervised monitor subprocess plus its stream framer.
pub struct MonitorProcess {
    config: MonitorConfig,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    framer: StreamFramer,
    chunk: Vec<u8>,
    reset_pending: bool,
    /// Consecutive exits without a single decoded value in between.
    failures: u32,
    launches: u64,
}

impl MonitorProcess {
    /// Create the supervisor. Nothing is launched until the first read.
    pub fn new(config: MonitorConfig) -> Self {
        let framer = StreamFramer::with_ceiling(config.buffer_ceiling);
        Self {
            config,
            child: None,
            stdout: None,
            framer,
            chunk: vec![0; READ_CHUNK],
            reset_pending: false,
            failures: 0,
            launches: 0,
        }
    }

    /// PID of the running child, if any.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// How many times the child has been launched so far.
    pub fn launches(&self) -> u64 {
        self.launches
    }

    // ── Non-blocking read ────────────────────────────────────────

    /// Return the next item if one is ready right now.
    ///
    /// Reads every byte currently in the pipe, then decodes at most one
    /// value. `Ok(None)` means "nothing yet", including when only a
    /// truncated value is buffered. Call again to pick up further values
    /// that may already be buffered.
    pub async fn try_next(&mut self) -> Result<Option<MonitorItem>, MonitorError> {
        self.ensure_running().await?;

        if self.reset_pending {
            self.reset_pending = false;
            return Ok(Some(MonitorItem::Reset));
        }

        self.read_available()?;

        if let Some(value) = self.framer.next_value()? {
            self.failures = 0;
            return DiffBatch::from_value(value).map(|batch| Some(MonitorItem::Batch(batch)));
        }

        if self.stdout.is_none() {
            // Pipe hit EOF and every complete value has been handed out.
            self.reap().await;
        }

        Ok(None)
    }

    // ── Blocking read ────────────────────────────────────────────

    /// Wait for the next batch of items.
    ///
    /// Blocks until the pipe is readable, then returns every item that
    /// can be produced without blocking again. With a timeout, returns an
    /// empty vec if nothing arrived in time.
    pub async fn next_batch(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Vec<MonitorItem>, MonitorError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let mut items = Vec::new();
            while let Some(item) = self.try_next().await? {
                // A relaunch ends the batch so a crash-looping child cannot
                // keep this call busy forever.
                let relaunched = matches!(item, MonitorItem::Reset) && !items.is_empty();
                items.push(item);
                if relaunched {
                    break;
                }
            }
            if !items.is_empty() {
                return Ok(items);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, self.wait_readable())
                        .await
                        .is_err()
                    {
                        return Ok(items);
                    }
                }
                None => self.wait_readable().await?,
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Kill the child (if any) and wait briefly for it to go away.
    pub async fn terminate(&mut self) {
        self.stdout = None;
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Err(e) = child.start_kill() {
            debug!(error = %e, "monitor already gone");
        }
        match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "monitor terminated"),
            Ok(Err(e)) => warn!(error = %e, "failed to reap monitor"),
            Err(_) => warn!("monitor did not exit within the grace period"),
        }
    }

    async fn ensure_running(&mut self) -> Result<(), MonitorError> {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait()? {
                None => return Ok(()),
                Some(status) if self.stdout.is_some() || !self.framer.is_empty() => {
                    // Exited, but its output is not fully consumed yet.
                    debug!(%status, "monitor exited, draining remaining output");
                    return Ok(());
                }
                Some(status) => {
                    warn!(%status, "monitor exited");
                    self.child = None;
                    self.failures += 1;
                }
            }
        }
        self.launch().await
    }

    async fn launch(&mut self) -> Result<(), MonitorError> {
        self.terminate().await;

        if self.failures > 1 {
            let delay = self.config.relaunch.delay(self.failures - 2);
            info!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                failures = self.failures,
                "waiting before relaunching monitor"
            );
            tokio::time::sleep(delay).await;
        }

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MonitorError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            MonitorError::Io(std::io::Error::other("monitor stdout was not captured"))
        })?;

        self.launches += 1;
        info!(
            pid = child.id(),
            program = %self.config.program.display(),
            launches = self.launches,
            "monitor launched"
        );

        self.child = Some(child);
        self.stdout = Some(stdout);
        self.framer.reset();
        self.reset_pending = true;
        Ok(())
    }

    /// Child closed its stdout: make sure it is gone so the next call relaunches.
    async fn reap(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                warn!("monitor closed its output but is still running, killing it");
            }
        }
        let had_child = self.child.is_some();
        self.terminate().await;
        if had_child {
            self.failures += 1;
        }
    }

    // ── Pipe I/O ─────────────────────────────────────────────────

    /// Pull every byte already sitting in the pipe without waiting.
    fn read_available(&mut self) -> Result<(), MonitorError> {
        while let Some(stdout) = self.stdout.as_mut() {
            match stdout.read(&mut self.chunk).now_or_never() {
                None => break,
                Some(Ok(0)) => {
                    debug!(buffered = self.framer.buffered(), "monitor pipe closed");
                    self.stdout = None;
                }
                Some(Ok(n)) => self.framer.push(&self.chunk[..n]),
                Some(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Wait until the pipe has data (or closes) and buffer what arrived.
    async fn wait_readable(&mut self) -> Result<(), MonitorError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(());
        };

        let n = stdout.read(&mut self.chunk).await?;
        if n == 0 {
            debug!(buffered = self.framer.buffered(), "monitor pipe closed");
            self.stdout = None;
        } else {
            self.framer.push(&self.chunk[..n]);
        }
        Ok(())
    }
}

impl std::fmt::Debug for MonitorProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorProcess")
            .field("program", &self.config.program)
            .field("pid", &self.pid())
            .field("buffered", &self.framer.buffered())
            .field("launches", &self.launches)
            .finish_non_exhaustive()
    }
}
