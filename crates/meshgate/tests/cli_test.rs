//! Integration tests for the `meshgate` CLI binary.
//!
//! Argument parsing, help output, shell completions, config handling and
//! the errors raised before any broker is reached. No gateway needed.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// A `meshgate` command whose config lives under `home`.
///
/// Clears every `MESHGATE_*` variable the CLI reads so the user's real
/// environment never leaks into a test.
fn meshgate_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("meshgate");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home)
        .env_remove("MESHGATE_PROFILE")
        .env_remove("MESHGATE_GATEWAY")
        .env_remove("MESHGATE_API_KEY")
        .env_remove("MESHGATE_OUTPUT")
        .env_remove("MESHGATE_TIMEOUT")
        .env_remove("RUST_LOG")
        .current_dir(home);
    cmd
}

fn write_config(home: &Path, body: &str) {
    let dir = home.join("meshgate");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), body).unwrap();
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = TempDir::new().unwrap();
    let output = meshgate_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("Bluetooth mesh")
            .and(predicate::str::contains("nodes"))
            .and(predicate::str::contains("subnets"))
            .and(predicate::str::contains("health")),
    );
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("meshgate"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_to_file() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("meshgate.fish");
    meshgate_cmd(home.path())
        .args(["completions", "fish", "--out"])
        .arg(&out)
        .assert()
        .success();
    assert!(std::fs::read_to_string(out).unwrap().contains("meshgate"));
}

// ── Argument errors ─────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let home = TempDir::new().unwrap();
    let output = meshgate_cmd(home.path()).arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_invalid_output_format() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["--output", "xml", "nodes", "list"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_address_out_of_range() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["nodes", "discover", "0x10000"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn test_delay_requires_transition() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["model", "onoff", "0x0005", "on", "--delay", "2"])
        .assert()
        .code(2);
}

// ── Configuration errors (exit 3) ───────────────────────────────────

#[test]
fn test_nodes_list_without_config() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["nodes", "list"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("config"));
}

#[test]
fn test_unknown_profile() {
    let home = TempDir::new().unwrap();
    write_config(home.path(), "[profiles.lab]\ngateway_id = \"nrf-1\"\n");
    meshgate_cmd(home.path())
        .args(["--profile", "missing", "beacons"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("lab"));
}

#[test]
fn test_profile_without_gateway() {
    let home = TempDir::new().unwrap();
    write_config(home.path(), "[profiles.default]\nhost = \"127.0.0.1\"\n");
    meshgate_cmd(home.path())
        .args(["subnets", "list"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("gateway"));
}

#[test]
fn test_missing_tls_credentials() {
    let home = TempDir::new().unwrap();
    write_config(
        home.path(),
        "[profiles.default]\nhost = \"127.0.0.1\"\ngateway_id = \"nrf-1\"\ncredentials = \"nowhere\"\n",
    );
    meshgate_cmd(home.path())
        .args(["subscriptions", "list"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("caCert.crt"));
}

// ── Config subcommands ──────────────────────────────────────────────

#[test]
fn test_config_path_under_home() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(home.path().to_string_lossy().as_ref()));
}

#[test]
fn test_config_show_no_config() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[defaults]"));
}

#[test]
fn test_config_set_then_show_redacts_key() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["config", "set", "gateway_id", "nrf-42"])
        .assert()
        .success();
    meshgate_cmd(home.path())
        .args(["config", "set", "api-key", "hunter2"])
        .assert()
        .success();

    meshgate_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("gateway_id = \"nrf-42\"")
                .and(predicate::str::contains("****"))
                .and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn test_config_set_unknown_key() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["config", "set", "controller", "x"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Valid keys"));
}

#[test]
fn test_config_use_and_profiles() {
    let home = TempDir::new().unwrap();
    write_config(
        home.path(),
        "[profiles.lab]\ngateway_id = \"nrf-1\"\n\n[profiles.home]\ngateway_id = \"nrf-2\"\n",
    );
    meshgate_cmd(home.path())
        .args(["config", "use", "home"])
        .assert()
        .success();
    meshgate_cmd(home.path())
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("home *").and(predicate::str::contains("lab")));
}

#[test]
fn test_config_use_unknown_profile() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["config", "use", "nope"])
        .assert()
        .code(3);
}

#[test]
fn test_config_show_json() {
    let home = TempDir::new().unwrap();
    let output = meshgate_cmd(home.path())
        .args(["-o", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["defaults"]["timeout"], 15);
}

// ── Subcommand discovery ────────────────────────────────────────────

#[test]
fn test_nodes_subcommands_exist() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["nodes", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("list")
                .and(predicate::str::contains("discover"))
                .and(predicate::str::contains("configure"))
                .and(predicate::str::contains("provision")),
        );
}

#[test]
fn test_health_subcommands_exist() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["health", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("faults")
                .and(predicate::str::contains("attention"))
                .and(predicate::str::contains("client-timeout")),
        );
}

#[test]
fn test_config_subcommands_exist() {
    let home = TempDir::new().unwrap();
    meshgate_cmd(home.path())
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("init")
                .and(predicate::str::contains("show"))
                .and(predicate::str::contains("use"))
                .and(predicate::str::contains("set-key")),
        );
}
