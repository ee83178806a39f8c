// Ping module - reachability check from the target

use super::{
    command_failure, param_str, ArgSpec, ArgumentSpec, Module, ModuleOutput, Params, System,
};

pub struct PingModule;

impl Module for PingModule {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn description(&self) -> &'static str {
        "Send one ICMP echo from the target and answer pong"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new().arg("host", ArgSpec::optional("127.0.0.1"))
    }

    fn run(&self, params: &Params, system: &dyn System) -> ModuleOutput {
        let host = param_str(params, "host");
        let count_flag = if cfg!(windows) { "-n" } else { "-c" };

        let result = system.run("ping", &[count_flag, "1", host]);
        if result.success() {
            ModuleOutput::ok().with_msg("pong").with("stdout", result.stdout)
        } else {
            command_failure(&result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::{params, FakeSystem};
    use serde_json::json;

    #[test]
    fn test_ping_answers_pong() {
        let system = FakeSystem::new();
        let out = PingModule.run(&params(json!({"host": "10.0.0.1"})), &system);

        assert!(!out.failed);
        assert!(!out.changed);
        assert_eq!(out.msg.as_deref(), Some("pong"));
        assert_eq!(system.calls().len(), 1);
        assert!(system.calls()[0].ends_with("1 10.0.0.1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreachable_host_fails() {
        let system =
            FakeSystem::new().respond("ping -c 1 10.9.9.9", 1, "", "Destination Host Unreachable");
        let out = PingModule.run(&params(json!({"host": "10.9.9.9"})), &system);

        assert!(out.failed);
        assert_eq!(out.msg.as_deref(), Some("Destination Host Unreachable"));
    }
}
