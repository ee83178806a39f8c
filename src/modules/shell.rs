// Shell module - run an arbitrary command line

use super::{param_str, ArgSpec, ArgumentSpec, Module, ModuleOutput, Params, System};

pub struct ShellModule;

impl Module for ShellModule {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn description(&self) -> &'static str {
        "Run a command line through the target's shell"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new().arg("cmd", ArgSpec::required())
    }

    fn run(&self, params: &Params, system: &dyn System) -> ModuleOutput {
        let cmd = param_str(params, "cmd");
        if cmd.trim().is_empty() {
            return ModuleOutput::failed("Parameter 'cmd' is required");
        }

        let result = system.shell(cmd);
        if result.success() {
            ModuleOutput::changed()
                .with("stdout", result.stdout.trim())
                .with("stderr", result.stderr.trim())
                .with("rc", result.returncode)
        } else {
            ModuleOutput::failed(result.stderr.trim())
                .with("stdout", result.stdout.trim())
                .with("rc", result.returncode)
        }
    }
}
