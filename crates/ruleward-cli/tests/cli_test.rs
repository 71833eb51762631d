//! Tests for the `ruleward` binary.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

const PLATFORM_RULE_ID: &str = "cb5eec70cf967a629a98bd4f25f0e5148fab21c3dd7d6bc831f77a594bf992f3";

fn write_temp(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn snapshot() -> NamedTempFile {
    write_temp(
        r#"{
            "ruleGroups": [
                {
                    "namespace": "openshift-monitoring",
                    "name": "openshift-node-rules",
                    "groups": [
                        {
                            "name": "node",
                            "rules": [
                                {"alert": "KubeNodeDown", "expr": "up == 0", "labels": {"severity": "warning", "team": "node"}}
                            ]
                        }
                    ]
                },
                {
                    "namespace": "team-a",
                    "name": "alerts",
                    "groups": [
                        {"name": "latency", "rules": [{"alert": "HighLatency", "expr": "latency > 1"}]}
                    ]
                }
            ],
            "relabelConfigs": [
                {
                    "namespace": "openshift-monitoring",
                    "name": "openshift-node-rules-kubenodedown-relabel",
                    "configs": [
                        {
                            "sourceLabels": ["alertname", "severity"],
                            "regex": "KubeNodeDown;.*",
                            "targetLabel": "severity",
                            "replacement": "critical",
                            "action": "Replace"
                        }
                    ]
                }
            ]
        }"#,
        ".json",
    )
}

fn ruleward() -> Command {
    let mut cmd = Command::cargo_bin("ruleward").unwrap();
    cmd.env_remove("RULEWARD_CONFIG");
    cmd
}

#[test]
fn id_prints_content_hash() {
    let rule = write_temp(
        r#"{"alert": "X", "expr": "up == 0", "for": "5m", "labels": {"severity": "warning"}}"#,
        ".json",
    );

    ruleward()
        .args(["id", "--rule"])
        .arg(rule.path())
        .assert()
        .success()
        .stdout("f0b472cbf4965e96044570e48cb77ff3dac8d2a9011abc07569eaed02fb1b61a\n");
}

#[test]
fn id_rejects_nameless_rule() {
    let rule = write_temp(r#"{"expr": "up == 0"}"#, ".json");

    ruleward()
        .args(["id", "--rule"])
        .arg(rule.path())
        .assert()
        .failure();
}

#[test]
fn list_filters_by_source() {
    let snapshot = snapshot();

    ruleward()
        .args(["list", "--source", "user-defined", "--snapshot"])
        .arg(snapshot.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("HighLatency"))
        .stdout(predicate::str::contains("KubeNodeDown").not());
}

#[test]
fn list_requires_namespace_with_name() {
    let snapshot = snapshot();

    ruleward()
        .args(["list", "--name", "alerts", "--snapshot"])
        .arg(snapshot.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("namespace must be specified"));
}

#[test]
fn get_replays_overlay() {
    let snapshot = snapshot();

    ruleward()
        .args(["get", "--id", PLATFORM_RULE_ID, "--snapshot"])
        .arg(snapshot.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""severity": "critical""#));
}

#[test]
fn get_unknown_id_fails() {
    let snapshot = snapshot();

    ruleward()
        .args(["get", "--id", &"0".repeat(64), "--snapshot"])
        .arg(snapshot.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn check_config_accepts_valid_file() {
    let config = write_temp("platform_prefix = \"platform-\"\ncall_timeout_secs = 5\n", ".toml");

    ruleward()
        .arg("check-config")
        .arg("--config")
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("platform-"));
}

#[test]
fn check_config_rejects_zero_timeout() {
    let config = write_temp("call_timeout_secs = 0\n", ".toml");

    ruleward()
        .arg("check-config")
        .arg("--config")
        .arg(config.path())
        .assert()
        .failure();
}

#[test]
fn check_config_requires_path() {
    ruleward().arg("check-config").assert().failure();
}
