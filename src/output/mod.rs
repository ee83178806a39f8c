// Output module for Stagehand

pub mod errors;
pub mod json_output;
pub mod terminal;

pub use errors::*;
pub use json_output::*;
pub use terminal::*;

use crate::executor::{HostReport, RunReport};

/// Output format for Stagehand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text output with colors
    #[default]
    Text,
    /// Machine-readable JSON output (NDJSON format)
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}' (expected text or json)", other)),
        }
    }
}

/// Unified output writer supporting both text and JSON formats
pub enum OutputWriter {
    Text(TerminalOutput),
    Json(JsonOutput),
    /// Library use and tests: print nothing
    Silent,
}

impl OutputWriter {
    pub fn new(format: OutputFormat, verbose: bool, quiet: bool) -> Self {
        match format {
            OutputFormat::Text => OutputWriter::Text(TerminalOutput::new(verbose, quiet)),
            OutputFormat::Json => OutputWriter::Json(JsonOutput::new(verbose, quiet)),
        }
    }

    pub fn silent() -> Self {
        OutputWriter::Silent
    }

    pub fn print_run_header(&self, target: &str, hosts_count: usize, tasks_count: usize) {
        match self {
            OutputWriter::Text(output) => output.print_run_header(target, hosts_count, tasks_count),
            OutputWriter::Json(output) => output.print_run_header(target, hosts_count, tasks_count),
            OutputWriter::Silent => {}
        }
    }

    pub fn print_host_report(&self, report: &HostReport) {
        match self {
            OutputWriter::Text(output) => output.print_host_report(report),
            OutputWriter::Json(output) => output.print_host_report(report),
            OutputWriter::Silent => {}
        }
    }

    pub fn print_recap(&self, report: &RunReport) {
        match self {
            OutputWriter::Text(output) => output.print_recap(report),
            OutputWriter::Json(output) => output.print_recap(report),
            OutputWriter::Silent => {}
        }
    }

    pub fn print_error(&self, err: &StagehandError) {
        match self {
            OutputWriter::Text(output) => output.print_error(err),
            OutputWriter::Json(output) => output.print_error(err),
            OutputWriter::Silent => {}
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use serde_json::{json, Map};

    use crate::executor::{TaskReport, TaskState};
    use crate::modules::Outcome;

    /// A classified debug task report carrying `msg`
    pub fn task_report(host: &str, outcome: Outcome, msg: &str) -> TaskReport {
        let mut result = Map::new();
        result.insert("msg".into(), json!(msg));
        result.insert("changed".into(), json!(outcome == Outcome::Changed));
        if outcome == Outcome::Failed {
            result.insert("failed".into(), json!(true));
        }
        TaskReport {
            host: host.into(),
            task: "say hi".into(),
            module: "debug".into(),
            outcome,
            state: TaskState::Classified,
            result,
            stdout: String::new(),
            stderr: String::new(),
            returncode: 0,
            register: None,
            duration: Duration::from_millis(5),
        }
    }
}
