// Service module - manage systemd services

use super::{
    command_failure, param_str, ArgSpec, ArgumentSpec, Module, ModuleOutput, Params, System,
};

pub struct ServiceModule;

impl Module for ServiceModule {
    fn name(&self) -> &'static str {
        "service"
    }

    fn description(&self) -> &'static str {
        "Start, stop, restart, enable or disable a systemd unit"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new().arg("name", ArgSpec::required()).arg(
            "state",
            ArgSpec::required().with_choices(&[
                "started", "stopped", "restarted", "status", "enable", "disable",
            ]),
        )
    }

    fn run(&self, params: &Params, system: &dyn System) -> ModuleOutput {
        let name = param_str(params, "name");
        let state = param_str(params, "state");

        let active = system.run("systemctl", &["is-active", name]).success();
        let enabled = || system.run("systemctl", &["is-enabled", name]).success();

        let action = match state {
            "started" if active => {
                return ModuleOutput::ok().with_msg(format!("Service {} already running", name))
            }
            "started" => "start",
            "stopped" if !active => {
                return ModuleOutput::ok().with_msg(format!("Service {} already stopped", name))
            }
            "stopped" => "stop",
            "restarted" => "restart",
            "enable" if enabled() => {
                return ModuleOutput::ok().with_msg(format!("Service {} already enabled", name))
            }
            "enable" => "enable",
            "disable" if !enabled() => {
                return ModuleOutput::ok().with_msg(format!("Service {} already disabled", name))
            }
            "disable" => "disable",
            "status" => {
                let msg = if active {
                    format!("Service {} is running", name)
                } else {
                    format!("Service {} is not running", name)
                };
                return ModuleOutput::ok().with_msg(msg).with("active", active);
            }
            other => return ModuleOutput::failed(format!("unsupported state '{}'", other)),
        };

        let result = system.run("systemctl", &[action, name]);
        if result.success() {
            ModuleOutput::changed().with_msg(format!("Service {} {}", name, state))
        } else {
            command_failure(&result)
        }
    }
}
