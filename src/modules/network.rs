// Network module - list listening sockets

use super::{ArgumentSpec, Module, ModuleOutput, Params, System};

pub struct NetworkModule;

impl Module for NetworkModule {
    fn name(&self) -> &'static str {
        "network"
    }

    fn description(&self) -> &'static str {
        "List TCP/UDP sockets with ss, falling back to netstat"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new()
    }

    fn run(&self, _params: &Params, system: &dyn System) -> ModuleOutput {
        let mut result = system.run("ss", &["-tunple"]);
        let mut tool = "ss";
        if !result.success() {
            result = system.run("netstat", &["-tunple"]);
            tool = "netstat";
            if !result.success() {
                return ModuleOutput::failed("Neither ss nor netstat is available on system");
            }
        }

        ModuleOutput::ok()
            .with_msg(result.stdout.trim())
            .with("tool", tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::{params, FakeSystem};
    use serde_json::json;

    #[test]
    fn test_uses_ss_when_available() {
        let system = FakeSystem::new().respond("ss -tunple", 0, "Netid State\n", "");
        let out = NetworkModule.run(&params(json!({})), &system);
        assert_eq!(out.msg.as_deref(), Some("Netid State"));
        assert_eq!(out.data["tool"], json!("ss"));
        assert_eq!(system.calls().len(), 1);
    }

    #[test]
    fn test_falls_back_to_netstat() {
        let system = FakeSystem::new()
            .respond("ss -tunple", 127, "", "ss: not found")
            .respond("netstat -tunple", 0, "Proto Recv-Q\n", "");
        let out = NetworkModule.run(&params(json!({})), &system);
        assert_eq!(out.data["tool"], json!("netstat"));
        assert!(!out.failed);
    }

    #[test]
    fn test_no_tool_available() {
        let system = FakeSystem::new()
            .respond("ss -tunple", 127, "", "")
            .respond("netstat -tunple", 127, "", "");
        let out = NetworkModule.run(&params(json!({})), &system);
        assert!(out.failed);
    }
}
