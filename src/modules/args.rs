// Module argument specifications and validation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Params;
use crate::output::errors::StagehandError;

/// Declared type of a module argument
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    #[default]
    Str,
    Bool,
    Int,
}

impl std::fmt::Display for ArgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgType::Str => write!(f, "str"),
            ArgType::Bool => write!(f, "bool"),
            ArgType::Int => write!(f, "int"),
        }
    }
}

/// Constraints for a single argument
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgSpec {
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "type", default)]
    pub kind: ArgType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ArgSpec {
    pub fn required() -> Self {
        ArgSpec {
            required: true,
            ..Default::default()
        }
    }

    pub fn optional(default: impl Into<Value>) -> Self {
        ArgSpec {
            default: Some(default.into()),
            ..Default::default()
        }
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_type(mut self, kind: ArgType) -> Self {
        self.kind = kind;
        self
    }

    fn coerce(&self, name: &str, value: &Value) -> Result<Value, String> {
        let coerced = match self.kind {
            ArgType::Str => match value {
                Value::String(_) => value.clone(),
                Value::Number(n) => Value::String(n.to_string()),
                Value::Bool(b) => Value::String(b.to_string()),
                other => return Err(format!("argument '{}' must be a string, got {}", name, other)),
            },
            ArgType::Bool => match value {
                Value::Bool(_) => value.clone(),
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "true" | "yes" | "on" | "1" => Value::Bool(true),
                    "false" | "no" | "off" | "0" => Value::Bool(false),
                    _ => return Err(format!("argument '{}' must be a boolean, got '{}'", name, s)),
                },
                Value::Number(n) => Value::Bool(n.as_i64().map_or(false, |i| i != 0)),
                other => {
                    return Err(format!(
                        "argument '{}' must be a boolean, got {}",
                        name, other
                    ))
                }
            },
            ArgType::Int => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => value.clone(),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| format!("argument '{}' must be an integer, got '{}'", name, s))?,
                other => {
                    return Err(format!(
                        "argument '{}' must be an integer, got {}",
                        name, other
                    ))
                }
            },
        };

        if !self.choices.is_empty() {
            let as_text = match &coerced {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !self.choices.iter().any(|c| *c == as_text) {
                return Err(format!(
                    "value of '{}' must be one of: {}, got '{}'",
                    name,
                    self.choices.join(", "),
                    as_text
                ));
            }
        }

        Ok(coerced)
    }
}

/// Argument name to constraints, as declared by a module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgumentSpec {
    args: BTreeMap<String, ArgSpec>,
}

impl ArgumentSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, name: &str, spec: ArgSpec) -> Self {
        self.args.insert(name.to_string(), spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArgSpec> {
        self.args.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgSpec)> {
        self.args.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Check required arguments, fill defaults, coerce types and enforce choices
    ///
    /// Arguments the spec does not mention pass through untouched.
    pub fn validate(&self, module: &str, params: &Params) -> Result<Params, StagehandError> {
        let invalid = |message: String| StagehandError::InvalidArguments {
            module: module.to_string(),
            message,
        };

        let mut out = params.clone();
        for (name, spec) in &self.args {
            match params.get(name).filter(|v| !v.is_null()) {
                Some(value) => {
                    let coerced = spec.coerce(name, value).map_err(invalid)?;
                    out.insert(name.clone(), coerced);
                }
                None if spec.required => {
                    return Err(invalid(format!("missing required argument '{}'", name)));
                }
                None => {
                    if let Some(ref default) = spec.default {
                        out.insert(name.clone(), default.clone());
                    }
                }
            }
        }
        Ok(out)
    }
}
