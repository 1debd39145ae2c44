//! Outbound control: surfaces that apply values, and the scheduler that
//! coalesces bursts of requests into one write per (target, field).

mod ddcutil;
mod pipewire;
mod scheduler;

use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::trace;

use crate::error::ControlError;
use crate::model::Level;

pub use ddcutil::{DdcutilSurface, DisplayField};
pub use pipewire::{PipeWireVolumeSurface, VolumeField, VolumeTarget};
pub use scheduler::{CallOutcome, CoalescingScheduler, FlushReport, SchedulerState};

/// An external endpoint that accepts one value per (target, field).
pub trait ControlSurface: Send + Sync + 'static {
    /// What a call addresses, e.g. a display number or a volume endpoint.
    type Target: Clone + Ord + Hash + Debug + Display + Send + Sync + 'static;
    /// Which property of the target is set.
    type Field: Copy + Ord + Hash + Debug + Display + Send + Sync + 'static;
    /// The value in the surface's own units.
    type Native: Debug + Send + 'static;

    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Convert a normalized level into native units. Called at flush time.
    fn scale(&self, target: &Self::Target, field: Self::Field, level: Level) -> Self::Native;

    /// Issue one call.
    fn send(
        &self,
        target: &Self::Target,
        field: Self::Field,
        value: Self::Native,
    ) -> impl Future<Output = Result<(), ControlError>> + Send;
}

/// Run an external tool to completion and map a non-zero exit to an error.
pub(crate) async fn run_tool(program: &Path, args: &[String]) -> Result<(), ControlError> {
    trace!(program = %program.display(), ?args, "running control tool");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ControlError::Spawn {
            program: program.display().to_string(),
            message: e.to_string(),
        })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = match stderr.trim() {
        "" => format!("{} exited with {}", program.display(), output.status),
        text => text.to_owned(),
    };
    Err(ControlError::Failed {
        message,
        status: output.status.code(),
    })
}
