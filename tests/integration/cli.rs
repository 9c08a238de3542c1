#[path = "common/mod.rs"]
mod common;

use std::{
    collections::BTreeSet,
    fs,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn kicker(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("kicker"));
    cmd.env("HOME", home);
    cmd
}

fn kickerd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("kickerd"));
    cmd.env("HOME", home);
    cmd
}

fn read_config(home: &Path) -> serde_json::Value {
    let raw = fs::read_to_string(home.join(".config/kicker/config.yaml"))
        .expect("read config file");
    serde_json::from_str(&raw).expect("config file is JSON")
}

#[test]
fn add_list_remove_flow() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path();

    kicker(home)
        .args(["add", "run_this.sh", "--if", "check_this.sh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added rule #1"));

    kicker(home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("#1"))
        .stdout(predicate::str::contains("run_this.sh"));

    let payload = read_config(home);
    let rules = payload["rules"].as_array().expect("rules array");
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0]["trigger_mode"], "on_zero");
    assert_eq!(rules[0]["once"], false);
    assert_eq!(rules[0]["check"], "check_this.sh");

    kicker(home)
        .args(["remove", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed rule #1"));

    kicker(home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No rules configured."));
}

#[test]
fn remove_unknown_rule_fails() {
    let temp = tempdir().expect("tempdir");
    kicker(temp.path())
        .args(["remove", "7"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("No rule with id 7."));
}

#[test]
fn add_if_code_requires_check() {
    let temp = tempdir().expect("tempdir");
    kicker(temp.path())
        .args(["add", "action.sh", "--if-code", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--check is required with --if-code"));
}

#[test]
fn add_if_code_with_check_records_the_code() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path();

    kicker(home)
        .args(["add", "action.sh", "--if-code", "5", "--check", "chk.sh"])
        .assert()
        .success();

    let payload = read_config(home);
    let rules = payload["rules"].as_array().expect("rules array");
    assert_eq!(rules[0]["trigger_mode"], "on_code_n");
    assert_eq!(rules[0]["trigger_code"], 5);
}

#[test]
fn add_trigger_flags_are_mutually_exclusive() {
    let temp = tempdir().expect("tempdir");
    kicker(temp.path())
        .args(["add", "act.sh", "--if", "a.sh", "--if-fail", "b.sh"])
        .assert()
        .failure();
}

#[test]
fn add_requires_a_trigger_flag() {
    let temp = tempdir().expect("tempdir");
    kicker(temp.path()).args(["add", "act.sh"]).assert().failure();
}

#[test]
fn add_if_pass_alias_and_if_fail() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path();

    kicker(home)
        .args(["add", "act-pass.sh", "--if-pass", "chk-pass.sh"])
        .assert()
        .success();
    kicker(home)
        .args(["add", "act-fail.sh", "--if-fail", "chk-fail.sh"])
        .assert()
        .success();

    let payload = read_config(home);
    let rules = payload["rules"].as_array().expect("rules array");
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0]["trigger_mode"], "on_zero");
    assert_eq!(rules[1]["trigger_mode"], "on_nonzero");
}

#[test]
fn add_transition_flags_map_to_their_modes() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path();

    kicker(home)
        .args(["add", "recover.sh", "--if-fail-to-pass", "chk.sh"])
        .assert()
        .success();
    kicker(home)
        .args(["add", "alert.sh", "--if-pass-to-fail", "chk.sh"])
        .assert()
        .success();

    let payload = read_config(home);
    let rules = payload["rules"].as_array().expect("rules array");
    assert_eq!(rules[0]["trigger_mode"], "on_transition_fail_to_pass");
    assert_eq!(rules[1]["trigger_mode"], "on_transition_pass_to_fail");
}

#[test]
fn add_once_flag_is_persisted() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path();

    kicker(home)
        .args(["add", "act.sh", "--if", "chk.sh", "--once"])
        .assert()
        .success();

    let payload = read_config(home);
    assert_eq!(payload["rules"][0]["once"], true);
}

#[test]
fn add_accepts_interval_rate_limit_and_timeout() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path();

    kicker(home)
        .args([
            "add",
            "act.sh",
            "--if-fail",
            "chk.sh",
            "--interval",
            "5",
            "--rate-limit",
            "2/60",
            "--timeout",
            "3.5",
        ])
        .assert()
        .success();

    let payload = read_config(home);
    let rule = &payload["rules"][0];
    assert_eq!(rule["poll_interval_seconds"], 5.0);
    assert_eq!(rule["rate_limit_count"], 2);
    assert_eq!(rule["rate_limit_seconds"], 60.0);
    assert_eq!(rule["timeout_seconds"], 3.5);
}

#[test]
fn add_rejects_malformed_rate_limits() {
    let temp = tempdir().expect("tempdir");
    kicker(temp.path())
        .args(["add", "act.sh", "--if", "chk.sh", "--rate-limit", "often"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "rate limit must be in number/seconds format",
        ));
}

#[test]
fn list_reports_broken_config_files() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path();
    let config_dir = home.join(".config/kicker");
    fs::create_dir_all(&config_dir).expect("config dir");
    fs::write(config_dir.join("config.yaml"), "version: 1\nrules: []\n")
        .expect("write non-JSON config");

    kicker(home).arg("list").assert().failure().stderr(
        predicate::str::contains("Config file must be valid JSON-compatible YAML"),
    );
}

#[test]
fn stats_lists_action_execution_counts() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path();

    kicker(home)
        .args(["add", "a1.sh", "--if", "c1.sh"])
        .assert()
        .success();
    kicker(home)
        .args(["add", "a2.sh", "--if-fail", "c2.sh"])
        .assert()
        .success();

    let state_dir = home.join(".local/state/kicker");
    fs::create_dir_all(&state_dir).expect("state dir");
    fs::write(
        state_dir.join("runtime_state.json"),
        r#"{"rules":{"1":{"action_executions":3},"2":{"action_executions":0}}}"#,
    )
    .expect("write runtime state");

    kicker(home)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "rule_id  action_executions  action_executions_24h",
        ))
        .stdout(predicate::str::contains("1        3                  0"))
        .stdout(predicate::str::contains("2        0                  0"));
}

#[test]
fn stats_counts_only_the_last_24_hours() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path();

    kicker(home)
        .args(["add", "a1.sh", "--if", "c1.sh"])
        .assert()
        .success();

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("epoch time")
        .as_secs_f64();
    let state_dir = home.join(".local/state/kicker");
    fs::create_dir_all(&state_dir).expect("state dir");
    fs::write(
        state_dir.join("runtime_state.json"),
        format!(
            r#"{{"rules":{{"1":{{"action_executions":5,"action_timestamps_24h":[{},{},{}]}}}}}}"#,
            now - 100.0,
            now - 3600.0,
            now - 90_000.0
        ),
    )
    .expect("write runtime state");

    kicker(home)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("1        5                  2"));
}

#[test]
fn daemon_status_without_metadata_fails() {
    let temp = tempdir().expect("tempdir");
    kicker(temp.path())
        .args(["daemon", "status"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("No daemon is running."));
}

#[test]
fn daemon_stop_is_idempotent_with_quiet() {
    let temp = tempdir().expect("tempdir");
    kicker(temp.path())
        .args(["daemon", "stop", "--quiet"])
        .assert()
        .success();

    kicker(temp.path())
        .args(["daemon", "stop"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("No daemon is running."));
}

#[test]
fn daemon_run_rejects_nonpositive_poll_interval() {
    let temp = tempdir().expect("tempdir");
    kicker(temp.path())
        .args(["daemon", "run", "--poll-interval", "0"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "default polling interval must be > 0",
        ));
}

fn long_options(help: &str) -> BTreeSet<String> {
    let mut options = BTreeSet::new();
    let mut rest = help;
    while let Some(start) = rest.find("--") {
        let tail = &rest[start + 2..];
        let end = tail
            .find(|c: char| !(c.is_ascii_lowercase() || c == '-'))
            .unwrap_or(tail.len());
        if end > 0 {
            options.insert(tail[..end].to_string());
        }
        rest = &tail[end..];
    }
    options
}

#[test]
fn kicker_daemon_run_and_kickerd_options_are_identical() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path();

    let kicker_help = kicker(home)
        .args(["daemon", "run", "--help"])
        .output()
        .expect("kicker help");
    let kickerd_help = kickerd(home).arg("--help").output().expect("kickerd help");
    assert!(kicker_help.status.success());
    assert!(kickerd_help.status.success());

    let kicker_opts = long_options(&String::from_utf8_lossy(&kicker_help.stdout));
    let kickerd_opts = long_options(&String::from_utf8_lossy(&kickerd_help.stdout));
    assert_eq!(kicker_opts, kickerd_opts);
}

#[test]
fn kickerd_rejects_nonpositive_poll_interval() {
    let temp = tempdir().expect("tempdir");
    kickerd(temp.path())
        .args(["--poll-interval", "0"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "default polling interval must be > 0",
        ));
}
