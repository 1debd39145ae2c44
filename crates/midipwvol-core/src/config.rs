// ── Runtime configuration ──
//
// These types describe *how* to run the pipeline: which monitor to
// launch, how to space relaunches, and where the control tools live.
// They never touch disk; midipwvol-config builds them from TOML/env.

use std::path::PathBuf;
use std::time::Duration;

use crate::monitor::DEFAULT_BUFFER_CEILING;

/// How to launch and supervise the monitoring subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Executable to run (e.g., `pw-dump`).
    pub program: PathBuf,
    /// Arguments enabling continuous-monitor mode.
    pub args: Vec<String>,
    /// Largest incomplete value tolerated before the stream is declared desynced.
    pub buffer_ceiling: usize,
    /// Spacing of relaunches after the monitor exits.
    pub relaunch: RelaunchPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("pw-dump"),
            args: vec!["--monitor".into()],
            buffer_ceiling: DEFAULT_BUFFER_CEILING,
            relaunch: RelaunchPolicy::default(),
        }
    }
}

/// Exponential backoff between consecutive monitor relaunches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaunchPolicy {
    /// Delay before the second consecutive relaunch. Default: 250ms.
    pub initial_delay: Duration,
    /// Upper bound on backoff delay. Default: 10s.
    pub max_delay: Duration,
}

impl Default for RelaunchPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RelaunchPolicy {
    /// Exponential backoff with jitter.
    ///
    /// `delay = min(initial * 2^attempt, max) * (1 ± 25%)`
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap, clippy::as_conversions)]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(attempt.min(30) as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        // Deterministic jitter seeded from the attempt number.
        let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
        Duration::from_secs_f64((capped * jitter_factor).max(0.0))
    }
}

/// External tools and timing for the control side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlsConfig {
    /// Quiet window a burst of requests must leave before it is flushed.
    pub debounce: Duration,
    /// Path to the `ddcutil` executable.
    pub ddcutil: PathBuf,
    /// Path to the `pw-cli` executable.
    pub pw_cli: PathBuf,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            ddcutil: PathBuf::from("ddcutil"),
            pw_cli: PathBuf::from("pw-cli"),
        }
    }
}

/// Everything the pipeline needs to start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub monitor: MonitorConfig,
    pub controls: ControlsConfig,
}
