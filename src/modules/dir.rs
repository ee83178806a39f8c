// Dir module - ensure a directory exists or is absent

use std::fs;
use std::path::Path;

use super::{
    param_bool, param_str, ArgSpec, ArgType, ArgumentSpec, Module, ModuleOutput, Params, System,
};

pub struct DirModule;

impl Module for DirModule {
    fn name(&self) -> &'static str {
        "dir"
    }

    fn description(&self) -> &'static str {
        "Create, remove or assert the presence of a directory"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new()
            .arg("path", ArgSpec::required())
            .arg(
                "state",
                ArgSpec::optional("create").with_choices(&["create", "absent", "exists"]),
            )
            .arg("recurse", ArgSpec::optional(false).with_type(ArgType::Bool))
    }

    fn run(&self, params: &Params, _system: &dyn System) -> ModuleOutput {
        let raw = param_str(params, "path");
        let path = Path::new(raw);

        match param_str(params, "state") {
            "exists" => {
                if path.is_dir() {
                    ModuleOutput::ok().with_msg(format!("Directory {} exists", raw))
                } else {
                    ModuleOutput::failed(format!("Directory {} does not exist", raw))
                }
            }
            "absent" => {
                if !path.exists() {
                    return ModuleOutput::ok().with_msg(format!("Directory {} already absent", raw));
                }
                if !path.is_dir() {
                    return ModuleOutput::failed(format!("{} exists but is not a directory", raw));
                }

                let removed = if param_bool(params, "recurse") {
                    fs::remove_dir_all(path)
                } else {
                    fs::remove_dir(path)
                };
                match removed {
                    Ok(()) => {
                        ModuleOutput::changed().with_msg(format!("Removed directory {}", raw))
                    }
                    Err(_) if path.read_dir().map_or(false, |mut d| d.next().is_some()) => {
                        ModuleOutput::failed(format!(
                            "Directory {} not empty, use recurse=true to force remove",
                            raw
                        ))
                    }
                    Err(e) => ModuleOutput::failed(format!("failed to remove {}: {}", raw, e)),
                }
            }
            _ => {
                if path.is_dir() {
                    return ModuleOutput::ok().with_msg(format!("Directory {} already exists", raw));
                }
                match fs::create_dir_all(path) {
                    Ok(()) => {
                        ModuleOutput::changed().with_msg(format!("Directory {} created", raw))
                    }
                    Err(e) => ModuleOutput::failed(format!("failed to create {}: {}", raw, e)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::{params, FakeSystem};
    use serde_json::json;

    #[test]
    fn test_create_then_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a/b");

        let create = params(json!({"path": path, "state": "create", "recurse": false}));
        assert!(DirModule.run(&create, &FakeSystem::new()).changed);
        assert!(!DirModule.run(&create, &FakeSystem::new()).changed);

        let exists = params(json!({"path": path, "state": "exists", "recurse": false}));
        assert!(!DirModule.run(&exists, &FakeSystem::new()).failed);
    }

    #[test]
    fn test_exists_fails_for_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let out = DirModule.run(
            &params(json!({"path": tmp.path().join("nope"), "state": "exists"})),
            &FakeSystem::new(),
        );
        assert!(out.failed);
    }

    #[test]
    fn test_absent_requires_recurse_for_non_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("full");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("f"), "x").unwrap();

        let plain = DirModule.run(
            &params(json!({"path": path, "state": "absent", "recurse": false})),
            &FakeSystem::new(),
        );
        assert!(plain.failed);
        assert!(plain.msg.unwrap().contains("recurse=true"));

        let forced = DirModule.run(
            &params(json!({"path": path, "state": "absent", "recurse": true})),
            &FakeSystem::new(),
        );
        assert!(forced.changed);
        assert!(!path.exists());
    }
}
