// Built-in modules for Stagehand

mod apt;
pub mod args;
pub mod catalog;
mod debug;
mod dir;
pub mod dispatch;
mod file;
mod network;
mod ping;
pub mod protocol;
mod service;
mod shell;
mod user;

pub use apt::AptModule;
pub use args::{ArgSpec, ArgType, ArgumentSpec};
pub use catalog::{BuiltinCatalog, ModuleCatalog, ModuleDescriptor};
pub use debug::DebugModule;
pub use dir::DirModule;
pub use file::FileModule;
pub use network::NetworkModule;
pub use ping::PingModule;
pub use protocol::{classify, Outcome};
pub use service::ServiceModule;
pub use shell::ShellModule;
pub use user::UserModule;

use std::process::Command;

use serde_json::{Map, Value};

use crate::executor::ExecutionResult;

/// Module arguments after validation
pub type Params = Map<String, Value>;

/// Trait for module implementations
///
/// Modules run inside the shim process on the target host and report through
/// a [`ModuleOutput`] that the shim prints as a single JSON object.
pub trait Module: Send + Sync {
    /// Module name, as used in playbooks
    fn name(&self) -> &'static str;

    /// One-line summary for `stagehand modules`
    fn description(&self) -> &'static str;

    fn argument_spec(&self) -> ArgumentSpec;

    /// Execute with validated params
    fn run(&self, params: &Params, system: &dyn System) -> ModuleOutput;
}

/// Process access for modules, so their decisions can be tested without a real host
pub trait System {
    /// Run a program with arguments, no shell involved
    fn run(&self, program: &str, args: &[&str]) -> ExecutionResult;

    /// Run a command line through the platform shell
    fn shell(&self, command: &str) -> ExecutionResult;
}

/// The machine the shim is running on
pub struct LocalSystem;

impl LocalSystem {
    fn capture(program: &str, cmd: &mut Command) -> ExecutionResult {
        match cmd.output() {
            Ok(output) => ExecutionResult {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                returncode: output.status.code().unwrap_or(-1),
            },
            Err(e) => ExecutionResult::transport_error(format!("failed to run {}: {}", program, e)),
        }
    }
}

impl System for LocalSystem {
    fn run(&self, program: &str, args: &[&str]) -> ExecutionResult {
        Self::capture(program, Command::new(program).args(args))
    }

    fn shell(&self, command: &str) -> ExecutionResult {
        if cfg!(windows) {
            Self::capture("cmd", Command::new("cmd").arg("/C").arg(command))
        } else {
            Self::capture("sh", Command::new("sh").arg("-c").arg(command))
        }
    }
}

/// What a module run reports back
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleOutput {
    pub changed: bool,
    pub failed: bool,
    pub msg: Option<String>,
    pub data: Map<String, Value>,
}

impl ModuleOutput {
    pub fn ok() -> Self {
        ModuleOutput {
            changed: false,
            failed: false,
            msg: None,
            data: Map::new(),
        }
    }

    pub fn changed() -> Self {
        ModuleOutput {
            changed: true,
            ..Self::ok()
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        ModuleOutput {
            failed: true,
            msg: Some(msg.into()),
            ..Self::ok()
        }
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    /// Process exit status for the shim
    pub fn exit_code(&self) -> i32 {
        if self.failed {
            1
        } else {
            0
        }
    }

    pub fn to_json(&self) -> Value {
        let mut map = self.data.clone();
        map.insert("changed".to_string(), Value::Bool(self.changed));
        if self.failed {
            map.insert("failed".to_string(), Value::Bool(true));
        }
        if let Some(ref msg) = self.msg {
            map.insert("msg".to_string(), Value::String(msg.clone()));
        }
        Value::Object(map)
    }
}

/// Failed output for a non-zero command, stderr preferred
pub(crate) fn command_failure(result: &ExecutionResult) -> ModuleOutput {
    ModuleOutput::failed(result.diagnostic()).with("rc", result.returncode)
}

/// A string parameter; validation has already enforced presence for required ones
pub(crate) fn param_str<'a>(params: &'a Params, key: &str) -> &'a str {
    params.get(key).and_then(Value::as_str).unwrap_or_default()
}

pub(crate) fn param_bool(params: &Params, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

static REGISTRY: &[&dyn Module] = &[
    &PingModule,
    &DebugModule,
    &ShellModule,
    &AptModule,
    &ServiceModule,
    &FileModule,
    &DirModule,
    &UserModule,
    &NetworkModule,
];

/// Every compiled-in module
pub fn registry() -> &'static [&'static dyn Module] {
    REGISTRY
}

/// Look up a module by name
pub fn lookup(name: &str) -> Option<&'static dyn Module> {
    REGISTRY.iter().copied().find(|m| m.name() == name)
}
