// YAML playbook parser

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use serde_yaml::Value as YamlValue;

use super::ast::*;
use crate::modules::{ModuleCatalog, Params};
use crate::output::errors::StagehandError;

/// Raw YAML play structure (before conversion)
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlay {
    name: Option<String>,
    sudo: Option<bool>,
    vars: Option<YamlValue>,
    tasks: Option<Vec<RawTask>>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    name: Option<String>,
    register: Option<String>,
    /// Override sudo for this task
    sudo: Option<bool>,
    #[serde(flatten)]
    module: BTreeMap<String, YamlValue>,
}

struct DocParser<'a> {
    source: Option<&'a Path>,
    catalog: &'a dyn ModuleCatalog,
}

/// Parse a playbook from a file
pub fn parse_playbook_file(
    path: &Path,
    catalog: &dyn ModuleCatalog,
) -> Result<Playbook, StagehandError> {
    let content = std::fs::read_to_string(path).map_err(|e| StagehandError::io(path, e))?;
    parse_playbook(&content, Some(path), catalog)
}

/// Load several playbook files, concatenating their plays in order
pub fn load_playbooks<P: AsRef<Path>>(
    paths: &[P],
    catalog: &dyn ModuleCatalog,
) -> Result<Playbook, StagehandError> {
    let mut playbook = Playbook::new();
    for path in paths {
        playbook.extend(parse_playbook_file(path.as_ref(), catalog)?);
    }
    Ok(playbook)
}

/// Parse a playbook from a string
///
/// A document is either a list of plays or a single play mapping. A single
/// mapping without a name is named after the file stem.
pub fn parse_playbook(
    content: &str,
    source: Option<&Path>,
    catalog: &dyn ModuleCatalog,
) -> Result<Playbook, StagehandError> {
    let parser = DocParser { source, catalog };

    let doc: YamlValue = serde_yaml::from_str(content).map_err(|e| {
        let location = e
            .location()
            .map(|l| format!(" at line {}, column {}", l.line(), l.column()))
            .unwrap_or_default();
        parser.error(format!("invalid YAML{}: {}", location, e))
    })?;

    let plays = match doc {
        YamlValue::Null => Vec::new(),
        YamlValue::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| parser.play(item, i))
            .collect::<Result<Vec<_>, _>>()?,
        item @ YamlValue::Mapping(_) => vec![parser.play(item, 0)?],
        _ => return Err(parser.error("playbook must be a list of plays or a single play mapping")),
    };

    Ok(Playbook { plays })
}

impl DocParser<'_> {
    fn error(&self, message: impl Into<String>) -> StagehandError {
        StagehandError::parse(self.source.map(Path::to_path_buf), message)
    }

    fn default_name(&self) -> String {
        self.source
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "playbook".to_string())
    }

    fn play(&self, item: YamlValue, index: usize) -> Result<Play, StagehandError> {
        let raw: RawPlay = serde_yaml::from_value(item)
            .map_err(|e| self.error(format!("play #{}: {}", index + 1, e)))?;

        let name = raw.name.unwrap_or_else(|| self.default_name());
        let vars = match raw.vars {
            None | Some(YamlValue::Null) => Map::new(),
            Some(v) => match yaml_to_json(&v) {
                Some(Value::Object(map)) => map,
                _ => return Err(self.error(format!("play '{}': vars must be a mapping", name))),
            },
        };

        let tasks = raw
            .tasks
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, t)| self.task(t, &name, i))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Play {
            name,
            vars,
            tasks,
            sudo: raw.sudo.unwrap_or(false),
        })
    }

    fn task(&self, raw: RawTask, play: &str, index: usize) -> Result<Task, StagehandError> {
        let label = raw
            .name
            .clone()
            .unwrap_or_else(|| format!("#{}", index + 1));

        let (modules, unknown): (Vec<_>, Vec<_>) = raw
            .module
            .into_iter()
            .partition(|(key, _)| self.catalog.contains(key));

        if let Some((key, _)) = unknown.first() {
            return Err(self.error(format!(
                "play '{}', task '{}': unknown key or module '{}'",
                play, label, key
            )));
        }

        let mut modules = modules.into_iter();
        let (module, value) = match (modules.next(), modules.next()) {
            (Some(found), None) => found,
            (None, _) => {
                return Err(self.error(format!(
                    "play '{}', task '{}': no module specified",
                    play, label
                )))
            }
            (Some((a, _)), Some((b, _))) => {
                return Err(self.error(format!(
                    "play '{}', task '{}': exactly one module expected, found '{}' and '{}'",
                    play, label, a, b
                )))
            }
        };

        let args: Params = match yaml_to_json(&value) {
            Some(Value::Null) => Params::new(),
            Some(Value::Object(map)) => map,
            _ => {
                return Err(self.error(format!(
                    "play '{}', task '{}': arguments for '{}' must be a mapping",
                    play, label, module
                )))
            }
        };

        Ok(Task {
            name: raw.name.unwrap_or_else(|| module.clone()),
            module,
            args,
            sudo: raw.sudo,
            register: raw.register,
        })
    }
}

/// Convert YAML to JSON; fails on non-string mapping keys
fn yaml_to_json(value: &YamlValue) -> Option<Value> {
    serde_json::to_value(value).ok()
}

/// Parse ad-hoc `key=value` pairs into module arguments
///
/// Values stay strings; the module's argument spec coerces them.
pub fn parse_module_args<S: AsRef<str>>(pairs: &[S]) -> Result<Params, StagehandError> {
    let mut args = Params::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            StagehandError::parse(
                None::<PathBuf>,
                format!("invalid argument '{}': expected key=value", pair),
            )
        })?;
        args.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(args)
}
