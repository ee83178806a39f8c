// JSON process-boundary protocol between the orchestrator and module runs

use std::fmt;
use std::io::Read;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Params;
use crate::executor::PlatformProfile;
use crate::output::errors::StagehandError;

/// Classified result of one task on one host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Changed,
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ok => write!(f, "ok"),
            Outcome::Changed => write!(f, "changed"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

/// JSON truthiness: `false`, `null`, `0`, `""` and empty containers are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// `failed` wins over `changed`; anything else is ok
pub fn classify(response: &Value) -> Outcome {
    let flag = |key: &str| response.get(key).map_or(false, is_truthy);
    if flag("failed") {
        Outcome::Failed
    } else if flag("changed") {
        Outcome::Changed
    } else {
        Outcome::Ok
    }
}

/// Parse module stdout into its response object
///
/// The whole output must be one JSON object; failing that, the last line that
/// parses as an object is taken so that banner noise before it is tolerated.
pub fn parse_response(stdout: &str) -> Result<Map<String, Value>, StagehandError> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(stdout.trim()) {
        return Ok(map);
    }

    stdout
        .lines()
        .rev()
        .filter(|line| !line.trim().is_empty())
        .find_map(|line| match serde_json::from_str::<Value>(line.trim()) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
        .ok_or_else(|| StagehandError::ModuleProtocol {
            message: if stdout.trim().is_empty() {
                "module produced no output".to_string()
            } else {
                "no JSON object found in module output".to_string()
            },
            raw: stdout.to_string(),
        })
}

/// Command line that runs a staged module through the shim
pub fn invoke_command(
    platform: PlatformProfile,
    shim: &str,
    module_path: &str,
    args: &Params,
) -> String {
    let json = Value::Object(args.clone()).to_string();
    format!(
        "{} {} --args {}",
        platform.quote(shim),
        platform.quote(module_path),
        platform.quote(&json)
    )
}

/// Arguments for a module run, from `--args <json>` or a JSON object on stdin
pub fn read_args<R: Read>(argv: &[String], mut stdin: R) -> Result<Params, String> {
    let raw = match argv.iter().position(|a| a == "--args") {
        Some(idx) => argv
            .get(idx + 1)
            .cloned()
            .ok_or_else(|| "--args requires a JSON value".to_string())?,
        None => {
            let mut buf = String::new();
            stdin
                .read_to_string(&mut buf)
                .map_err(|e| format!("failed to read arguments from stdin: {}", e))?;
            buf
        }
    };

    if raw.trim().is_empty() {
        return Ok(Params::new());
    }

    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Params::new()),
        Ok(other) => Err(format!("arguments must be a JSON object, got {}", other)),
        Err(e) => Err(format!("invalid JSON arguments: {}", e)),
    }
}
