//! Clap derive structures for the `midipwvol` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// midipwvol -- MIDI knobs for PipeWire volumes and monitor brightness
#[derive(Debug, Parser)]
#[command(
    name = "midipwvol",
    version,
    about = "Control PipeWire volumes and DDC/CI monitors from a MIDI controller",
    long_about = "Mirrors the PipeWire object graph from `pw-dump --monitor`, reads\n\
        controller events as JSON lines, and applies the configured bindings\n\
        with debounced `pw-cli` and `ddcutil` calls.",
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    /// Defaults to `run`
    #[command(subcommand)]
    pub command: Option<Command>,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (default: $XDG_CONFIG_HOME/midipwvol/config.toml)
    #[arg(long, short = 'c', env = "MIDIPWVOL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// One object id per line (scripting)
    Plain,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Mirror PipeWire and apply bindings to incoming controller events
    Run(RunArgs),

    /// Print mirrored PipeWire objects, optionally filtered
    #[command(alias = "ls")]
    Objects(ObjectsArgs),

    /// Load and validate the config, then print the resolved settings
    CheckConfig,
}

#[derive(Debug, Args, Default)]
pub struct RunArgs {
    /// Read JSON-lines controller events from this file instead of stdin
    #[arg(long, short = 'i')]
    pub input: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ObjectsArgs {
    /// Filter as attribute=value; value is JSON when it parses, else a string.
    /// Repeat for a conjunction.
    #[arg(long, short = 'f', value_name = "ATTR=VALUE")]
    pub filter: Vec<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    pub output: OutputFormat,

    /// Consider the snapshot complete after this long without monitor output (ms)
    #[arg(long, default_value = "300")]
    pub settle_ms: u64,

    /// Give up if the monitor produced nothing within this many seconds
    #[arg(long, default_value = "10")]
    pub timeout: u64,
}
