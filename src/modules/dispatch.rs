// Shim-side entry point: load a staged descriptor and run its module

use std::io::Read;
use std::path::Path;

use super::catalog::ModuleDescriptor;
use super::protocol::read_args;
use super::{lookup, ModuleOutput, System};

/// Run one module invocation as the shim does
///
/// `argv` excludes the program name: `<descriptor> [--args <json>]`. Arguments
/// come from stdin when `--args` is absent. Every failure is reported through
/// the returned output, never as a panic.
pub fn invoke<R: Read>(argv: &[String], stdin: R, system: &dyn System) -> ModuleOutput {
    let descriptor_path = match argv.first().filter(|a| a.as_str() != "--args") {
        Some(path) => path,
        None => {
            return ModuleOutput::failed(
                "usage: stagehand-module <descriptor.json> [--args <json>]",
            )
        }
    };

    let descriptor = match ModuleDescriptor::load(Path::new(descriptor_path)) {
        Ok(d) => d,
        Err(e) => return ModuleOutput::failed(e.to_string()),
    };

    let module = match lookup(&descriptor.module) {
        Some(m) => m,
        None => return ModuleOutput::failed(format!("unknown module: {}", descriptor.module)),
    };

    let raw = match read_args(argv, stdin) {
        Ok(params) => params,
        Err(msg) => return ModuleOutput::failed(msg),
    };

    match descriptor.argument_spec.validate(module.name(), &raw) {
        Ok(params) => module.run(&params, system),
        Err(e) => ModuleOutput::failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::catalog::{BuiltinCatalog, ModuleCatalog};
    use crate::modules::testing::FakeSystem;
    use serde_json::json;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_invoke_debug_via_args_flag() {
        let catalog = BuiltinCatalog::new().unwrap();
        let path = catalog.payload("debug").unwrap();
        let out = invoke(
            &argv(&[path.to_str().unwrap(), "--args", r#"{"msg": "hi"}"#]),
            std::io::empty(),
            &FakeSystem::new(),
        );
        assert_eq!(out.to_json(), json!({"changed": false, "msg": "hi"}));
    }

    #[test]
    fn test_invoke_reads_stdin() {
        let catalog = BuiltinCatalog::new().unwrap();
        let path = catalog.payload("debug").unwrap();
        let out = invoke(
            &argv(&[path.to_str().unwrap()]),
            r#"{"msg": "from stdin"}"#.as_bytes(),
            &FakeSystem::new(),
        );
        assert_eq!(out.msg.as_deref(), Some("from stdin"));
    }

    #[test]
    fn test_invalid_arguments_fail() {
        let catalog = BuiltinCatalog::new().unwrap();
        let path = catalog.payload("shell").unwrap();
        let out = invoke(
            &argv(&[path.to_str().unwrap(), "--args", "{}"]),
            std::io::empty(),
            &FakeSystem::new(),
        );
        assert!(out.failed);
        assert_eq!(out.exit_code(), 1);
        assert!(out.msg.unwrap().contains("missing required argument 'cmd'"));
    }

    #[test]
    fn test_missing_descriptor_fails() {
        let out = invoke(
            &argv(&["/no/such/descriptor.json"]),
            std::io::empty(),
            &FakeSystem::new(),
        );
        assert!(out.failed);

        let usage = invoke(&argv(&[]), std::io::empty(), &FakeSystem::new());
        assert!(usage.msg.unwrap().starts_with("usage:"));
    }
}
