//! Integration tests for the `midipwvol` binary.
//!
//! The PipeWire and DDC tools are replaced by small shell scripts, so
//! these run without a PipeWire session or a monitor attached.
#![allow(clippy::unwrap_used)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the binary with env isolation.
///
/// Points config directories at a nonexistent path and clears
/// `MIDIPWVOL_*` overrides so tests never read the user's config.
fn midipwvol_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("midipwvol");
    cmd.env("HOME", "/tmp/midipwvol-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/midipwvol-cli-test-nonexistent")
        .env_remove("MIDIPWVOL_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

/// A monitor that prints one snapshot and then stays alive.
fn fake_monitor(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "pw-dump",
        r#"printf '%s\n' '[{"id":40,"type":"PipeWire:Interface:Node","info":{"props":{"media.class":"Audio/Source","node.description":"Microphone"}}},{"id":41,"type":"PipeWire:Interface:Node","info":{"props":{"media.class":"Audio/Sink","node.description":"Speakers"}}}]'
exec sleep 30"#,
    )
}

fn monitor_config(dir: &Path) -> PathBuf {
    let monitor = fake_monitor(dir);
    write_config(
        dir,
        &format!(
            "[monitor]\nprogram = \"{}\"\nargs = []\n",
            monitor.display()
        ),
    )
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    midipwvol_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("PipeWire")
            .and(predicate::str::contains("run"))
            .and(predicate::str::contains("objects"))
            .and(predicate::str::contains("check-config")),
    );
}

#[test]
fn test_version_flag() {
    midipwvol_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("midipwvol"));
}

#[test]
fn test_unknown_subcommand_is_usage_error() {
    midipwvol_cmd().arg("frobnicate").assert().code(2);
}

// ── check-config ────────────────────────────────────────────────────

#[test]
fn test_check_config_lists_bindings() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[controls]
debounce_ms = 100

[[bindings]]
control = 7
action = "volume"
filters = { node_description = "Speakers", is_sink = true }

[[bindings]]
control = 8
port = "nano"
action = "brightness"
displays = [1, 2]
"#,
    );

    midipwvol_cmd()
        .arg("--config")
        .arg(&config)
        .arg("check-config")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("debounce_ms = 100")
                .and(predicate::str::contains("# 2 binding(s)"))
                .and(predicate::str::contains("cc 7"))
                .and(predicate::str::contains("cc 8 on *nano*")),
        );
}

#[test]
fn test_check_config_without_file_uses_defaults() {
    midipwvol_cmd()
        .arg("check-config")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("not found, using defaults")
                .and(predicate::str::contains("pw-dump")),
        );
}

#[test]
fn test_invalid_binding_exits_with_usage_code() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "[[bindings]]\ncontrol = 200\naction = \"contrast\"\ndisplays = [1]\n",
    );

    midipwvol_cmd()
        .arg("-c")
        .arg(&config)
        .arg("check-config")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_missing_explicit_config_exits_with_usage_code() {
    midipwvol_cmd()
        .args(["-c", "/tmp/midipwvol-cli-test-nonexistent/config.toml", "check-config"])
        .assert()
        .code(2);
}

// ── objects ─────────────────────────────────────────────────────────

#[test]
fn test_objects_filters_to_json() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(dir.path());

    let output = midipwvol_cmd()
        .arg("-c")
        .arg(&config)
        .args(["objects", "--filter", "is_sink=true", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    insta::assert_json_snapshot!(value, @r#"
    [
      {
        "id": 41,
        "info": {
          "props": {
            "media.class": "Audio/Sink",
            "node.description": "Speakers"
          }
        },
        "type": "PipeWire:Interface:Node"
      }
    ]
    "#);
}

#[test]
fn test_objects_table_shows_names() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(dir.path());

    midipwvol_cmd()
        .arg("-c")
        .arg(&config)
        .arg("ls")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Speakers")
                .and(predicate::str::contains("Microphone"))
                .and(predicate::str::contains("Audio/Sink")),
        );
}

#[test]
fn test_objects_plain_with_regex_filter() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(dir.path());

    midipwvol_cmd()
        .arg("-c")
        .arg(&config)
        .args(["objects", "-o", "plain", "-f", r#"node_description={"regex":"Mic"}"#])
        .assert()
        .success()
        .stdout("40\n");
}

#[test]
fn test_objects_float_filter_is_rejected() {
    midipwvol_cmd()
        .args(["objects", "--filter", "node_id=1.5"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("floating-point"));
}

#[test]
fn test_objects_missing_monitor_program() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "[monitor]\nprogram = \"/nonexistent/pw-dump\"\n",
    );

    midipwvol_cmd()
        .arg("-c")
        .arg(&config)
        .arg("objects")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("PipeWire monitor failed"));
}

#[test]
fn test_objects_silent_monitor_times_out() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "[monitor]\nprogram = \"sleep\"\nargs = [\"30\"]\n",
    );

    midipwvol_cmd()
        .arg("-c")
        .arg(&config)
        .args(["objects", "--timeout", "1"])
        .assert()
        .code(8);
}

// ── run ─────────────────────────────────────────────────────────────

#[test]
fn test_run_applies_display_binding_from_input_file() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("ddcutil.log");
    let ddcutil = write_script(
        dir.path(),
        "ddcutil",
        &format!("echo \"$@\" >> '{}'", log.display()),
    );
    let config = write_config(
        dir.path(),
        &format!(
            r#"
[monitor]
program = "sleep"
args = ["30"]

[controls]
ddcutil = "{}"
debounce_ms = 50

[[bindings]]
control = 7
action = "brightness"
displays = [1]
"#,
            ddcutil.display()
        ),
    );
    let events = dir.path().join("events.jsonl");
    fs::write(
        &events,
        concat!(
            r#"{"port":"nano","type":"control_change","channel":0,"control":7,"value":10}"#,
            "\n\n",
            r#"{"port":"nano","type":"note_on","channel":0,"note":60,"velocity":90}"#,
            "\n",
            r#"{"port":"nano","type":"control_change","channel":0,"control":7,"value":127}"#,
            "\n",
        ),
    )
    .unwrap();

    midipwvol_cmd()
        .arg("-c")
        .arg(&config)
        .arg("run")
        .arg("--input")
        .arg(&events)
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success();

    let calls = fs::read_to_string(&log).unwrap();
    assert_eq!(calls.lines().last(), Some("--display 1 setvcp 0x10 100"));
}

#[test]
fn test_run_rejects_malformed_input() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "[monitor]\nprogram = \"sleep\"\nargs = [\"30\"]\n",
    );
    let events = dir.path().join("events.jsonl");
    fs::write(&events, "{not json}\n").unwrap();

    midipwvol_cmd()
        .arg("-c")
        .arg(&config)
        .args(["run", "--input"])
        .arg(&events)
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .code(4);
}
