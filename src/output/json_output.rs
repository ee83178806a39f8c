// JSON output for structured logging

use serde_json::{json, Value};

use super::errors::StagehandError;
use crate::executor::{HostReport, RunReport, TaskReport};

/// JSON output manager for machine-readable logging
pub struct JsonOutput {
    verbose: bool,
    quiet: bool,
}

impl JsonOutput {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        JsonOutput { verbose, quiet }
    }

    /// Print a header for a run
    pub fn print_run_header(&self, target: &str, hosts_count: usize, tasks_count: usize) {
        if self.quiet {
            return;
        }

        let event = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "run_start",
            "target": target,
            "hosts_count": hosts_count,
            "tasks_count": tasks_count,
        });

        self.emit_json(&event);
    }

    /// Print everything one host did
    pub fn print_host_report(&self, report: &HostReport) {
        if self.quiet && !report.failed() {
            return;
        }

        self.emit_json(&self.host_event(report));
    }

    fn host_event(&self, report: &HostReport) -> Value {
        let tasks: Vec<Value> = report.tasks.iter().map(|t| self.task_value(t)).collect();
        let status = if let Some(ref err) = report.error {
            err.host_status()
        } else if report.failed() {
            "failed"
        } else {
            "ok"
        };

        json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "host_complete",
            "host": report.host,
            "status": status,
            "error": report.error.as_ref().map(|e| e.to_string()),
            "duration_ms": report.duration.as_millis(),
            "tasks": tasks,
        })
    }

    fn task_value(&self, task: &TaskReport) -> Value {
        let mut value = json!({
            "task": task.task,
            "module": task.module,
            "status": task.outcome,
            "duration_ms": task.duration.as_millis(),
            "result": task.result,
        });

        if let Some(ref name) = task.register {
            value["register"] = json!(name);
        }

        if self.verbose || task.is_failed() {
            value["rc"] = json!(task.returncode);
            if !task.stdout.is_empty() {
                value["stdout"] = json!(task.stdout);
            }
            if !task.stderr.is_empty() {
                value["stderr"] = json!(task.stderr);
            }
        }

        value
    }

    /// Print the run recap summary
    pub fn print_recap(&self, report: &RunReport) {
        if self.quiet {
            return;
        }

        let hosts: serde_json::Map<String, Value> = report
            .hosts
            .iter()
            .map(|h| {
                (
                    h.host.clone(),
                    json!({
                        "ok": h.ok_count(),
                        "changed": h.changed_count(),
                        "failed": h.failed_count(),
                        "unreachable": matches!(h.error, Some(StagehandError::Connect { .. })),
                        "status": h.error.as_ref().map(StagehandError::host_status),
                    }),
                )
            })
            .collect();

        let event = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "run_complete",
            "hosts": hosts,
            "total_duration_ms": report.duration.as_millis(),
            "total_failed": report.total_failed(),
            "total_changed": report.total_changed(),
            "success": report.success(),
        });

        self.emit_json(&event);
    }

    pub fn print_error(&self, err: &StagehandError) {
        let event = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "error",
            "message": err.to_string(),
            "hint": err.suggestion(),
        });

        self.emit_json(&event);
    }

    /// Emit a JSON object as a single line (NDJSON format)
    fn emit_json(&self, value: &Value) {
        if let Ok(json_str) = serde_json::to_string(value) {
            println!("{}", json_str);
        }
    }
}
