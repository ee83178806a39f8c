// Per-host task runner: stage, invoke, classify

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};

use super::Environment;
use crate::modules::protocol::{classify, parse_response};
use crate::modules::Outcome;
use crate::output::errors::StagehandError;
use crate::parser::ast::{Play, Playbook, Task};

/// Progress of a task through one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Staged,
    Invoked,
    Classified,
}

/// Result of one task on one host
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub host: String,
    pub task: String,
    pub module: String,
    pub outcome: Outcome,
    pub state: TaskState,
    /// Parsed module response; for unparseable output, a synthesized failure
    pub result: Map<String, Value>,
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
    pub register: Option<String>,
    #[serde(skip)]
    pub duration: Duration,
}

impl TaskReport {
    pub fn msg(&self) -> Option<&str> {
        self.result.get("msg").and_then(Value::as_str)
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == Outcome::Failed
    }

    pub fn is_changed(&self) -> bool {
        self.outcome == Outcome::Changed
    }
}

impl Task {
    /// Stage the module if needed, invoke it once and classify the response
    ///
    /// Only environment failures surface as `Err`; a failing module is a
    /// `Failed` report.
    pub async fn run(
        &self,
        env: &Environment<'_>,
        elevate: bool,
    ) -> Result<TaskReport, StagehandError> {
        let started = Instant::now();
        let mut state = TaskState::Pending;
        tracing::info!(
            host = %env.host_name(),
            task = %self.name,
            module = %self.module,
            elevate,
            "running task"
        );

        env.stage_module(&self.module).await?;
        state = advance(state, TaskState::Staged);

        let raw = env.invoke(&self.module, &self.args, elevate).await;
        state = advance(state, TaskState::Invoked);

        let result = match parse_response(&raw.stdout) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(host = %env.host_name(), task = %self.name, "{}", e);
                protocol_failure(&e, &raw.stderr, raw.returncode)
            }
        };
        let outcome = classify(&Value::Object(result.clone()));
        state = advance(state, TaskState::Classified);

        tracing::debug!(
            host = %env.host_name(),
            task = %self.name,
            %outcome,
            rc = raw.returncode,
            "task classified"
        );

        Ok(TaskReport {
            host: env.host_name().to_string(),
            task: self.name.clone(),
            module: self.module.clone(),
            outcome,
            state,
            result,
            stdout: raw.stdout,
            stderr: raw.stderr,
            returncode: raw.returncode,
            register: self.register.clone(),
            duration: started.elapsed(),
        })
    }
}

fn advance(from: TaskState, to: TaskState) -> TaskState {
    debug_assert!(from <= to, "task state moved backwards");
    to
}

fn protocol_failure(err: &StagehandError, stderr: &str, returncode: i32) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("failed".to_string(), Value::Bool(true));
    let stderr = stderr.trim();
    let msg = if stderr.is_empty() {
        err.to_string()
    } else {
        format!("{}: {}", err, stderr)
    };
    map.insert("msg".to_string(), Value::String(msg));
    map.insert("rc".to_string(), Value::from(returncode));
    if let StagehandError::ModuleProtocol { raw, .. } = err {
        map.insert("raw".to_string(), Value::String(raw.clone()));
    }
    map
}

impl Play {
    /// Run every task in order, appending reports to `reports`
    ///
    /// A failed task does not stop the play; an environment failure does.
    pub async fn play(
        &self,
        env: &Environment<'_>,
        force_sudo: bool,
        reports: &mut Vec<TaskReport>,
    ) -> Result<(), StagehandError> {
        tracing::info!(
            host = %env.host_name(),
            play = %self.name,
            tasks = self.tasks.len(),
            "starting play"
        );
        for task in &self.tasks {
            let elevate = force_sudo || task.elevate(self.sudo);
            reports.push(task.run(env, elevate).await?);
        }
        Ok(())
    }
}

impl Playbook {
    /// Run every play in order against one environment
    pub async fn play(
        &self,
        env: &Environment<'_>,
        force_sudo: bool,
        reports: &mut Vec<TaskReport>,
    ) -> Result<(), StagehandError> {
        for play in &self.plays {
            play.play(env, force_sudo, reports).await?;
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::executor::environment::testing::{Counters, RecordingConnection};
    use crate::executor::{PlatformProfile, RunConfig};
    use crate::modules::BuiltinCatalog;

    fn script_shim(dir: &Path, body: &str) -> std::path::PathBuf {
        let shim = dir.join("shim.sh");
        std::fs::write(&shim, format!("#!/bin/sh\n{}\n", body)).unwrap();
        shim
    }

    fn config(base: &Path, shim: &Path) -> RunConfig {
        RunConfig {
            staging_base: Some(base.to_string_lossy().to_string()),
            ..RunConfig::default()
        }
        .with_shim(PlatformProfile::Unix, shim)
    }

    #[tokio::test]
    async fn test_task_run_classifies_response() {
        let base = tempfile::tempdir().unwrap();
        let shim = script_shim(base.path(), r#"echo '{"changed": true, "msg": "done"}'"#);
        let conn = RecordingConnection::new(Arc::new(Counters::default()));
        let catalog = BuiltinCatalog::new().unwrap();
        let env = Environment::init(&conn, &catalog, &config(base.path(), &shim)).await.unwrap();

        let report = Task::new("touch it", "debug")
            .with_register("touched")
            .run(&env, false)
            .await
            .unwrap();
        env.destroy().await;

        assert_eq!(report.outcome, Outcome::Changed);
        assert_eq!(report.state, TaskState::Classified);
        assert_eq!(report.msg(), Some("done"));
        assert_eq!(report.register.as_deref(), Some("touched"));
        assert_eq!(report.host, "recorder");
    }

    #[tokio::test]
    async fn test_garbage_output_is_failed_with_raw_kept() {
        let base = tempfile::tempdir().unwrap();
        let shim = script_shim(
            base.path(),
            "echo 'Traceback: everything is on fire'; echo oops >&2; exit 1",
        );
        let conn = RecordingConnection::new(Arc::new(Counters::default()));
        let catalog = BuiltinCatalog::new().unwrap();
        let env = Environment::init(&conn, &catalog, &config(base.path(), &shim)).await.unwrap();

        let report = Task::new("broken", "debug").run(&env, false).await.unwrap();
        env.destroy().await;

        assert!(report.is_failed());
        assert_eq!(report.returncode, 1);
        assert_eq!(report.result["raw"], Value::from("Traceback: everything is on fire\n"));
        assert!(report.msg().unwrap().contains("oops"));
    }

    #[tokio::test]
    async fn test_play_continues_after_failed_task() {
        let base = tempfile::tempdir().unwrap();
        // Fails for the shell module, succeeds otherwise
        let shim = script_shim(
            base.path(),
            r#"case "$1" in
  *shell.json) echo '{"failed": true, "msg": "bad"}'; exit 1;;
  *) echo '{"changed": false}';;
esac"#,
        );
        let counters = Arc::new(Counters::default());
        let conn = RecordingConnection::new(counters.clone());
        let catalog = BuiltinCatalog::new().unwrap();
        let env = Environment::init(&conn, &catalog, &config(base.path(), &shim)).await.unwrap();

        let play = Play::new("mixed")
            .with_task(Task::new("first", "shell").with_arg("cmd", "false"))
            .with_task(Task::new("second", "debug"))
            .with_task(Task::new("third", "debug"));
        let mut reports = Vec::new();
        Playbook::new()
            .with_play(play)
            .play(&env, false, &mut reports)
            .await
            .unwrap();
        env.destroy().await;

        let outcomes: Vec<_> = reports.iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, vec![Outcome::Failed, Outcome::Ok, Outcome::Ok]);
        // shim, shell payload, debug payload once
        assert_eq!(counters.copies(), 3);
    }
}
