// Debug module - echo a message back

use super::{param_str, ArgSpec, ArgumentSpec, Module, ModuleOutput, Params, System};

pub struct DebugModule;

impl Module for DebugModule {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn description(&self) -> &'static str {
        "Echo a message back without touching the target"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new().arg("msg", ArgSpec::optional("Hello from debug!"))
    }

    fn run(&self, params: &Params, _system: &dyn System) -> ModuleOutput {
        ModuleOutput::ok().with_msg(param_str(params, "msg"))
    }
}
