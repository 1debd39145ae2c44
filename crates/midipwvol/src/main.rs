mod bindings;
mod cli;
mod error;
mod output;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tokio::io::BufReader;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use midipwvol_config::{Config, load_config};
use midipwvol_core::dispatch::{input_feeder, monitor_feeder};
use midipwvol_core::{
    CoalescingScheduler, ControlSurface, DdcutilSurface, DispatchError, Dispatcher,
    JsonLinesInput, Mirror, MonitorItem, MonitorProcess, PipeWireVolumeSurface, Query,
    dispatch_queue,
};

use crate::bindings::BindingHandler;
use crate::cli::{Cli, Command, GlobalOpts, ObjectsArgs, RunArgs};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    // Exit here: a pending blocking stdin read would hold up runtime shutdown.
    std::process::exit(code);
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let path = cli
        .global
        .config
        .clone()
        .unwrap_or_else(midipwvol_config::config_path);
    let config =
        load_config(cli.global.config.as_deref()).map_err(|e| CliError::config(e, &path))?;

    match cli.command.unwrap_or_else(|| Command::Run(RunArgs::default())) {
        Command::Run(args) => run_pipeline(&config, &path, args).await,
        Command::Objects(args) => list_objects(&config, &path, &args, &cli.global).await,
        Command::CheckConfig => check_config(&config, &path, &cli.global),
    }
}

fn joined<T>(result: Result<T, JoinError>) -> Result<T, CliError> {
    result.map_err(|e| CliError::Task(e.to_string()))
}

// ── run ──────────────────────────────────────────────────────────────

async fn run_pipeline(config: &Config, path: &Path, args: RunArgs) -> Result<(), CliError> {
    let runtime = config.runtime().map_err(|e| CliError::config(e, path))?;
    let bindings = config.bindings().map_err(|e| CliError::config(e, path))?;
    if bindings.is_empty() {
        warn!(config = %path.display(), "no bindings configured, input events will be ignored");
    }

    let mirror = Arc::new(Mirror::new());
    let controls = &runtime.controls;
    let volume = Arc::new(CoalescingScheduler::spawn(
        PipeWireVolumeSurface::new(&controls.pw_cli, Arc::clone(&mirror)),
        controls.debounce,
    ));
    let display = Arc::new(CoalescingScheduler::spawn(
        DdcutilSurface::new(&controls.ddcutil),
        controls.debounce,
    ));

    let handler = BindingHandler::new(bindings, Arc::clone(&volume), Arc::clone(&display));
    let (tx, rx) = dispatch_queue();

    // Input exhaustion stops only the monitor; the dispatcher then drains
    // what is queued and sees the queue close.
    let shutdown = CancellationToken::new();
    let monitor_stop = shutdown.child_token();

    let mut monitor_task = tokio::spawn(monitor_feeder(
        MonitorProcess::new(runtime.monitor),
        tx.clone(),
        monitor_stop.clone(),
    ));
    let mut input_task = match args.input {
        Some(file) => {
            let reader = BufReader::new(tokio::fs::File::open(&file).await?);
            info!(path = %file.display(), "reading input events from file");
            tokio::spawn(input_feeder(JsonLinesInput::new(reader), tx, shutdown.clone()))
        }
        None => tokio::spawn(input_feeder(JsonLinesInput::stdin(), tx, shutdown.clone())),
    };
    let mut dispatch_task = tokio::spawn(
        Dispatcher::new(Arc::clone(&mirror), handler, rx).run(shutdown.clone()),
    );

    let mut monitor_done = false;
    let mut input_done = false;
    let outcome = loop {
        tokio::select! {
            result = &mut dispatch_task => {
                break match joined(result)? {
                    Err(DispatchError::QueueClosed) if input_done => Ok(()),
                    other => other.map_err(CliError::from),
                };
            }
            result = &mut monitor_task, if !monitor_done => {
                monitor_done = true;
                joined(result)??;
            }
            result = &mut input_task, if !input_done => {
                input_done = true;
                joined(result)??;
                info!("input exhausted, draining queued events");
                monitor_stop.cancel();
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("interrupted");
                break Ok(());
            }
        }
    };

    shutdown.cancel();
    if !monitor_done {
        // Lets the feeder terminate the monitor child.
        if let Err(e) = joined(monitor_task.await) {
            warn!(error = %e, "monitor feeder did not shut down cleanly");
        }
    }

    close_scheduler(&volume).await;
    close_scheduler(&display).await;

    debug!(objects = mirror.len(), "pipeline stopped");
    outcome
}

async fn close_scheduler<S: ControlSurface>(scheduler: &CoalescingScheduler<S>) {
    let report = scheduler.close().await;
    let failed = report.failures().count();
    if failed > 0 {
        warn!(failed, surface = scheduler.surface().name(), "final flush had failures");
    }
}

// ── objects ──────────────────────────────────────────────────────────

async fn list_objects(
    config: &Config,
    path: &Path,
    args: &ObjectsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let runtime = config.runtime().map_err(|e| CliError::config(e, path))?;
    let query = parse_filters(&args.filter)?;

    let mirror = Mirror::new();
    let mut monitor = MonitorProcess::new(runtime.monitor);
    let settled = settle(
        &mut monitor,
        &mirror,
        Duration::from_millis(args.settle_ms),
        args.timeout,
    )
    .await;
    monitor.terminate().await;
    settled?;

    let objects: Vec<_> = mirror.query_all(&query).collect();
    debug!(query = %query, matched = objects.len(), total = mirror.len(), "objects selected");

    let rendered = output::render_objects(args.output, &objects)?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

/// Feed the mirror until the monitor has been quiet for `quiet` after
/// producing data, or `timeout_secs` elapse.
async fn settle(
    monitor: &mut MonitorProcess,
    mirror: &Mirror,
    quiet: Duration,
    timeout_secs: u64,
) -> Result<(), CliError> {
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    let mut seen_data = false;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return if seen_data {
                Ok(())
            } else {
                Err(CliError::MonitorTimeout {
                    seconds: timeout_secs,
                })
            };
        }

        let wait = if seen_data { quiet.min(remaining) } else { remaining };
        let items = monitor.next_batch(Some(wait)).await?;
        if items.is_empty() && seen_data {
            return Ok(());
        }
        for item in items {
            match item {
                MonitorItem::Reset => mirror.apply_reset(),
                MonitorItem::Batch(batch) => {
                    seen_data = true;
                    mirror.apply_batch(batch);
                }
            }
        }
    }
}

/// Parse `attr=value` filters. The value is JSON when it parses as JSON,
/// otherwise a plain string.
fn parse_filters(raw: &[String]) -> Result<Query, CliError> {
    let specs = raw
        .iter()
        .map(|filter| {
            let (name, value) =
                filter
                    .split_once('=')
                    .ok_or_else(|| CliError::Validation {
                        field: "--filter".into(),
                        reason: format!("expected ATTR=VALUE, got `{filter}`"),
                    })?;
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| Value::String(value.to_owned()));
            Ok((name.trim().to_owned(), value))
        })
        .collect::<Result<Vec<(String, Value)>, CliError>>()?;

    Ok(Query::from_specs(
        specs.iter().map(|(name, value)| (name.as_str(), value)),
    )?)
}

// ── check-config ─────────────────────────────────────────────────────

fn check_config(config: &Config, path: &Path, global: &GlobalOpts) -> Result<(), CliError> {
    config.runtime().map_err(|e| CliError::config(e, path))?;
    let bindings = config.bindings().map_err(|e| CliError::config(e, path))?;
    let toml = config.to_toml().map_err(|e| CliError::config(e, path))?;

    let mut lines = vec![format!("# {}", display_path(path)), toml];
    lines.push(format!("# {} binding(s)", bindings.len()));
    lines.extend(bindings.iter().map(|b| format!("#   {b}")));
    output::print_output(&lines.join("\n"), global.quiet);
    Ok(())
}

fn display_path(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", path.display())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn filters_parse_json_or_fall_back_to_strings() {
        let query = parse_filters(&[
            "is_sink=true".to_owned(),
            "node_description=Built-in Audio".to_owned(),
            r#"media_class={"regex":"Audio/"}"#.to_owned(),
        ])
        .unwrap();
        assert_eq!(query.filters().len(), 3);
        assert_eq!(
            query.to_string(),
            r#"is_sink=true, node_description="Built-in Audio", media_class=/Audio//"#
        );
    }

    #[test]
    fn filter_without_equals_is_rejected() {
        let err = parse_filters(&["is_sink".to_owned()]).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn float_filter_is_a_query_error() {
        let err = parse_filters(&["node_id=1.5".to_owned()]).unwrap_err();
        assert!(matches!(err, CliError::Query(_)));
        assert_eq!(err.exit_code(), error::exit_code::USAGE);
    }
}
