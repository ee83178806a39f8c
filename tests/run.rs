// End-to-end runs against loopback hosts with the real module runner

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use stagehand::executor::PlatformProfile;
use stagehand::modules::Params;
use stagehand::parser::parse_playbook;
use stagehand::{BuiltinCatalog, Executor, Inventory, Outcome, RunConfig, StagehandError};

const INVENTORY: &str = r#"
all:
  children:
    web:
      hosts:
        a:
          ip: 127.0.0.1
        b:
          ip: 127.0.0.1
    mixed:
      hosts:
        gone:
          ip: 127.0.0.2
          port: 1
          timeout: 1
        here:
          ip: 127.0.0.1
"#;

fn shim() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_stagehand-module"))
}

fn executor(base: &Path) -> Executor {
    let config = RunConfig {
        staging_base: Some(base.to_string_lossy().to_string()),
        connect_timeout: Some(Duration::from_secs(1)),
        ..RunConfig::default()
    }
    .with_shim(PlatformProfile::Unix, shim());
    Executor::new(
        Inventory::parse_str(INVENTORY).unwrap(),
        Arc::new(BuiltinCatalog::new().unwrap()),
        config,
    )
}

fn staging_roots(base: &Path) -> usize {
    std::fs::read_dir(base)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".stagehand_"))
        .count()
}

#[tokio::test]
async fn test_debug_play_on_group() {
    let base = tempfile::tempdir().unwrap();
    let exec = executor(base.path());
    let catalog = BuiltinCatalog::new().unwrap();
    let playbook = parse_playbook(
        "- name: greet\n  tasks:\n    - name: say hi\n      debug:\n        msg: hi\n",
        None,
        &catalog,
    )
    .unwrap();

    let report = exec.run_playbook("web", &playbook).await.unwrap();

    assert_eq!(report.hosts.len(), 2);
    for host in &report.hosts {
        assert!(host.error.is_none(), "{}: {:?}", host.host, host.error);
        assert_eq!(host.tasks.len(), 1);
        assert_eq!(host.tasks[0].outcome, Outcome::Ok);
        assert_eq!(host.tasks[0].msg(), Some("hi"));
    }
    assert!(report.success());
    assert_eq!(staging_roots(base.path()), 0);
}

#[tokio::test]
async fn test_unreachable_host_does_not_stop_siblings() {
    let base = tempfile::tempdir().unwrap();
    let exec = executor(base.path());

    let report = exec
        .run_module("mixed", "debug", false, Params::new())
        .await
        .unwrap();

    let gone = report.host("gone").unwrap();
    assert!(matches!(gone.error, Some(StagehandError::Connect { .. })));
    assert!(gone.tasks.is_empty());

    let here = report.host("here").unwrap();
    assert!(here.error.is_none());
    assert_eq!(here.tasks[0].msg(), Some("Hello from debug!"));
    assert!(!report.success());
}

#[tokio::test]
async fn test_shell_failure_is_task_data() {
    let base = tempfile::tempdir().unwrap();
    let exec = executor(base.path());
    let catalog = BuiltinCatalog::new().unwrap();
    let playbook = parse_playbook(
        r#"
tasks:
  - name: break
    shell:
      cmd: "echo nope >&2; exit 3"
  - name: still runs
    shell:
      cmd: echo fine
    register: fine
"#,
        None,
        &catalog,
    )
    .unwrap();

    let report = exec.run_playbook("a", &playbook).await.unwrap();
    let host = report.host("a").unwrap();

    assert!(host.error.is_none());
    assert_eq!(host.tasks[0].outcome, Outcome::Failed);
    assert_eq!(host.tasks[0].msg(), Some("nope"));
    assert_eq!(host.tasks[1].outcome, Outcome::Changed);
    assert_eq!(host.registered("fine").unwrap().result["stdout"], json!("fine"));
}

#[test]
fn test_module_runner_protocol() {
    let catalog = BuiltinCatalog::new().unwrap();
    let descriptor = stagehand::ModuleCatalog::payload(&catalog, "debug").unwrap();

    let ok = Command::new(shim())
        .arg(&descriptor)
        .args(["--args", r#"{"msg": "hello"}"#])
        .output()
        .unwrap();
    assert_eq!(ok.status.code(), Some(0));
    let body: Value = serde_json::from_slice(&ok.stdout).unwrap();
    assert_eq!(body, json!({"changed": false, "msg": "hello"}));

    let bad = Command::new(shim())
        .arg(&descriptor)
        .args(["--args", r#"{"msg": ["not", "a", "string"]}"#])
        .output()
        .unwrap();
    assert_eq!(bad.status.code(), Some(1));
    let body: Value = serde_json::from_slice(&bad.stdout).unwrap();
    assert_eq!(body["failed"], json!(true));
}

#[tokio::test]
#[ignore = "needs a ping binary"]
async fn test_ping_round_trip() {
    let base = tempfile::tempdir().unwrap();
    let report = executor(base.path())
        .run_module("a", "ping", false, Params::new())
        .await
        .unwrap();

    let task = &report.host("a").unwrap().tasks[0];
    assert_eq!(task.outcome, Outcome::Ok);
    assert!(task.msg().unwrap().contains("pong"));
}

#[tokio::test]
#[ignore = "needs apt and root"]
async fn test_apt_is_idempotent() {
    let base = tempfile::tempdir().unwrap();
    let exec = executor(base.path());
    let mut args = Params::new();
    args.insert("name".into(), json!("curl"));

    exec.run_module("a", "apt", false, args.clone()).await.unwrap();
    let second = exec.run_module("a", "apt", false, args).await.unwrap();

    let task = &second.host("a").unwrap().tasks[0];
    assert_eq!(task.outcome, Outcome::Ok);
    assert_eq!(task.result["changed"], json!(false));
}
