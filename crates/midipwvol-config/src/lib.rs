//! Configuration for midipwvol.
//!
//! A TOML file plus `MIDIPWVOL_*` environment overrides, layered with
//! `figment`, then validated into core runtime types and compiled
//! [`Binding`]s. The binary adds its CLI-flag handling on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use midipwvol_core::control::DisplayField;
use midipwvol_core::error::QueryError;
use midipwvol_core::{
    ControlsConfig, Level, MonitorConfig, Query, RelaunchPolicy, RuntimeConfig,
};

/// Largest 7-bit controller number.
const MAX_CONTROL: u8 = 127;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("invalid filter in bindings[{index}]: {source}")]
    Filter {
        index: usize,
        #[source]
        source: QueryError,
    },

    #[error("config file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub controls: ControlsSection,

    /// Controller-to-action mappings.
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
}

/// `[monitor]`: the `pw-dump` subprocess.
#[derive(Debug, Deserialize, Serialize)]
pub struct MonitorSection {
    #[serde(default = "default_monitor_program")]
    pub program: PathBuf,

    #[serde(default = "default_monitor_args")]
    pub args: Vec<String>,

    /// Bytes of an incomplete value tolerated before giving up.
    #[serde(default = "default_buffer_ceiling")]
    pub buffer_ceiling: usize,

    #[serde(default = "default_relaunch_initial_delay_ms")]
    pub relaunch_initial_delay_ms: u64,

    #[serde(default = "default_relaunch_max_delay_ms")]
    pub relaunch_max_delay_ms: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            program: default_monitor_program(),
            args: default_monitor_args(),
            buffer_ceiling: default_buffer_ceiling(),
            relaunch_initial_delay_ms: default_relaunch_initial_delay_ms(),
            relaunch_max_delay_ms: default_relaunch_max_delay_ms(),
        }
    }
}

fn default_monitor_program() -> PathBuf {
    "pw-dump".into()
}
fn default_monitor_args() -> Vec<String> {
    vec!["--monitor".into()]
}
fn default_buffer_ceiling() -> usize {
    midipwvol_core::monitor::DEFAULT_BUFFER_CEILING
}
fn default_relaunch_initial_delay_ms() -> u64 {
    250
}
fn default_relaunch_max_delay_ms() -> u64 {
    10_000
}

/// `[controls]`: external tools and the debounce window.
#[derive(Debug, Deserialize, Serialize)]
pub struct ControlsSection {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_ddcutil")]
    pub ddcutil: PathBuf,

    #[serde(default = "default_pw_cli")]
    pub pw_cli: PathBuf,
}

impl Default for ControlsSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            ddcutil: default_ddcutil(),
            pw_cli: default_pw_cli(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    250
}
fn default_ddcutil() -> PathBuf {
    "ddcutil".into()
}
fn default_pw_cli() -> PathBuf {
    "pw-cli".into()
}

/// What a binding does with the controller value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Volume,
    Brightness,
    Contrast,
}

/// One `[[bindings]]` entry as written in the file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BindingConfig {
    /// Controller (CC) number, 0–127.
    pub control: u8,

    /// Only events from ports whose name contains this string.
    pub port: Option<String>,

    pub action: ActionKind,

    /// Attribute → predicate spec, for `volume`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, Value>,

    /// ddcutil display numbers, for `brightness` and `contrast`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub displays: Vec<u32>,

    /// Output range the 0–127 input is mapped onto (normalized).
    pub min: Option<f64>,
    pub max: Option<f64>,
}

// ── Compiled bindings ───────────────────────────────────────────────

/// A validated binding, ready for the input handler.
#[derive(Debug, Clone)]
pub struct Binding {
    pub control: u8,
    pub port: Option<String>,
    pub action: BindingAction,
    pub min: Level,
    pub max: Level,
}

#[derive(Debug, Clone)]
pub enum BindingAction {
    /// Set the volume of the first object matching `query`.
    Volume { query: Query },
    /// Set a VCP feature on each display.
    Display {
        field: DisplayField,
        displays: Vec<u32>,
    },
}

impl Binding {
    /// Whether an event from `port` should reach this binding.
    pub fn accepts_port(&self, port: &str) -> bool {
        self.port.as_deref().is_none_or(|wanted| port.contains(wanted))
    }

    /// Map a raw 7-bit controller value onto this binding's output range.
    pub fn level(&self, value: u8) -> Level {
        Level::from_midi(value).remap(self.min, self.max)
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cc {}", self.control)?;
        if let Some(port) = &self.port {
            write!(f, " on *{port}*")?;
        }
        match &self.action {
            BindingAction::Volume { query } => write!(f, " → volume of [{query}]")?,
            BindingAction::Display { field, displays } => {
                write!(f, " → {field} of displays {displays:?}")?;
            }
        }
        write!(f, " ({}..{})", self.min, self.max)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "midipwvol").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("midipwvol");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// The provider stack: defaults, then the TOML file, then environment.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("MIDIPWVOL_").split("__"))
}

/// Load the config from `path`, or from [`config_path`] when `None`.
///
/// An explicit path must exist; the default location may be absent.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(explicit) if !explicit.exists() => {
            return Err(ConfigError::NotFound {
                path: explicit.to_path_buf(),
            });
        }
        Some(explicit) => explicit.to_path_buf(),
        None => config_path(),
    };

    let config: Config = figment(&path).extract()?;
    Ok(config)
}

impl Config {
    /// Core runtime settings for the monitor and control surfaces.
    pub fn runtime(&self) -> Result<RuntimeConfig, ConfigError> {
        let m = &self.monitor;
        if m.buffer_ceiling == 0 {
            return Err(ConfigError::Validation {
                field: "monitor.buffer_ceiling".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if m.relaunch_initial_delay_ms > m.relaunch_max_delay_ms {
            return Err(ConfigError::Validation {
                field: "monitor.relaunch_initial_delay_ms".into(),
                reason: format!(
                    "{} exceeds relaunch_max_delay_ms ({})",
                    m.relaunch_initial_delay_ms, m.relaunch_max_delay_ms
                ),
            });
        }

        Ok(RuntimeConfig {
            monitor: MonitorConfig {
                program: m.program.clone(),
                args: m.args.clone(),
                buffer_ceiling: m.buffer_ceiling,
                relaunch: RelaunchPolicy {
                    initial_delay: Duration::from_millis(m.relaunch_initial_delay_ms),
                    max_delay: Duration::from_millis(m.relaunch_max_delay_ms),
                },
            },
            controls: ControlsConfig {
                debounce: Duration::from_millis(self.controls.debounce_ms),
                ddcutil: self.controls.ddcutil.clone(),
                pw_cli: self.controls.pw_cli.clone(),
            },
        })
    }

    /// Validate and compile every `[[bindings]]` entry.
    pub fn bindings(&self) -> Result<Vec<Binding>, ConfigError> {
        self.bindings
            .iter()
            .enumerate()
            .map(|(index, binding)| compile_binding(index, binding))
            .collect()
    }

    /// Render as TOML, e.g. for `check-config`.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn compile_binding(index: usize, cfg: &BindingConfig) -> Result<Binding, ConfigError> {
    let invalid = |field: &str, reason: String| ConfigError::Validation {
        field: format!("bindings[{index}].{field}"),
        reason,
    };

    if cfg.control > MAX_CONTROL {
        return Err(invalid("control", format!("{} is above {MAX_CONTROL}", cfg.control)));
    }

    let min = bound(cfg.min, 0.0).map_err(|r| invalid("min", r))?;
    let max = bound(cfg.max, 1.0).map_err(|r| invalid("max", r))?;
    if min > max {
        return Err(invalid("min", format!("{min} is greater than max {max}")));
    }

    let action = match cfg.action {
        ActionKind::Volume => {
            if cfg.filters.is_empty() {
                return Err(invalid("filters", "a volume binding needs at least one filter".into()));
            }
            let query = Query::from_specs(cfg.filters.iter())
                .map_err(|source| ConfigError::Filter { index, source })?;
            BindingAction::Volume { query }
        }
        ActionKind::Brightness | ActionKind::Contrast => {
            if cfg.displays.is_empty() {
                return Err(invalid("displays", "list at least one display number".into()));
            }
            let field = if cfg.action == ActionKind::Brightness {
                DisplayField::Brightness
            } else {
                DisplayField::Contrast
            };
            BindingAction::Display {
                field,
                displays: cfg.displays.clone(),
            }
        }
    };

    Ok(Binding {
        control: cfg.control,
        port: cfg.port.clone(),
        action,
        min,
        max,
    })
}

fn bound(value: Option<f64>, default: f64) -> Result<Level, String> {
    let value = value.unwrap_or(default);
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{value} is outside 0.0..=1.0"));
    }
    Ok(Level::new(value))
}
