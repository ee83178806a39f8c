// File module - ensure a file exists with given content, or is absent

use std::fs;
use std::path::Path;

use super::{param_str, ArgSpec, ArgumentSpec, Module, ModuleOutput, Params, System};

pub struct FileModule;

impl Module for FileModule {
    fn name(&self) -> &'static str {
        "file"
    }

    fn description(&self) -> &'static str {
        "Ensure a regular file exists with given content, or is absent"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new()
            .arg("path", ArgSpec::required())
            .arg(
                "state",
                ArgSpec::optional("present").with_choices(&["present", "absent"]),
            )
            .arg("content", ArgSpec::optional(""))
    }

    fn run(&self, params: &Params, _system: &dyn System) -> ModuleOutput {
        let path = Path::new(param_str(params, "path"));
        let content = param_str(params, "content");

        if param_str(params, "state") == "absent" {
            if !path.exists() {
                return ModuleOutput::ok().with_msg("File already absent");
            }
            return match fs::remove_file(path) {
                Ok(()) => ModuleOutput::changed().with_msg("File removed"),
                Err(e) => {
                    ModuleOutput::failed(format!("failed to remove {}: {}", path.display(), e))
                }
            };
        }

        let msg = match fs::read_to_string(path) {
            Ok(current) if current == content => {
                return ModuleOutput::ok().with_msg("File already exists with same content")
            }
            Ok(_) => "File content updated",
            Err(_) if path.exists() => {
                return ModuleOutput::failed(format!(
                    "{} exists but is not a readable text file",
                    path.display()
                ))
            }
            Err(_) => "File created",
        };

        match fs::write(path, content) {
            Ok(()) => ModuleOutput::changed().with_msg(msg),
            Err(e) => ModuleOutput::failed(format!("failed to write {}: {}", path.display(), e)),
        }
    }
}
