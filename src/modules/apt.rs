// Apt module - install/remove Debian packages

use super::{
    command_failure, param_str, ArgSpec, ArgumentSpec, Module, ModuleOutput, Params, System,
};

pub struct AptModule;

impl AptModule {
    /// Whether dpkg reports the package fully installed
    fn is_installed(system: &dyn System, name: &str) -> bool {
        let result = system.run("dpkg", &["-s", name]);
        result.success() && result.stdout.contains("Status: install ok installed")
    }
}

impl Module for AptModule {
    fn name(&self) -> &'static str {
        "apt"
    }

    fn description(&self) -> &'static str {
        "Install or remove a package with apt-get"
    }

    fn argument_spec(&self) -> ArgumentSpec {
        ArgumentSpec::new().arg("name", ArgSpec::required()).arg(
            "state",
            ArgSpec::optional("present").with_choices(&["present", "absent"]),
        )
    }

    fn run(&self, params: &Params, system: &dyn System) -> ModuleOutput {
        let name = param_str(params, "name");
        let state = param_str(params, "state");
        if name.is_empty() {
            return ModuleOutput::failed("Parameter 'name' is required");
        }

        let installed = Self::is_installed(system, name);
        let args: [&str; 3] = match (state, installed) {
            ("absent", false) => {
                return ModuleOutput::ok().with_msg(format!("Package {} is not installed", name))
            }
            ("absent", true) => ["-y", "remove", name],
            (_, true) => {
                return ModuleOutput::ok()
                    .with_msg(format!("Package {} is already installed", name))
            }
            (_, false) => ["-y", "install", name],
        };

        let result = system.run("apt-get", &args);
        if result.success() {
            ModuleOutput::changed()
                .with_msg(format!("Package {} {}", name, state))
                .with("stdout", result.stdout)
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

    const INSTALLED: &str = "Package: curl\nStatus: install ok installed\n";

    #[test]
    fn test_install_missing_package() {
        let system = FakeSystem::new().respond("dpkg -s curl", 1, "", "not installed");
        let out = AptModule.run(&params(json!({"name": "curl", "state": "present"})), &system);

        assert!(out.changed);
        assert_eq!(system.calls(), vec!["dpkg -s curl", "apt-get -y install curl"]);
    }

    #[test]
    fn test_installed_package_is_unchanged() {
        let system = FakeSystem::new().respond("dpkg -s curl", 0, INSTALLED, "");
        let out = AptModule.run(&params(json!({"name": "curl", "state": "present"})), &system);

        assert!(!out.changed);
        assert!(!out.failed);
        assert_eq!(system.calls(), vec!["dpkg -s curl"]);
    }

    #[test]
    fn test_remove() {
        let system = FakeSystem::new().respond("dpkg -s curl", 0, INSTALLED, "");
        let out = AptModule.run(&params(json!({"name": "curl", "state": "absent"})), &system);
        assert!(out.changed);
        assert_eq!(system.calls()[1], "apt-get -y remove curl");

        let absent = FakeSystem::new().respond("dpkg -s curl", 1, "", "");
        let out = AptModule.run(&params(json!({"name": "curl", "state": "absent"})), &absent);
        assert!(!out.changed);
    }

    #[test]
    fn test_apt_failure() {
        let system = FakeSystem::new()
            .respond("dpkg -s nosuch", 1, "", "")
            .respond("apt-get -y install nosuch", 100, "", "E: Unable to locate package nosuch\n");
        let out = AptModule.run(&params(json!({"name": "nosuch", "state": "present"})), &system);

        assert!(out.failed);
        assert_eq!(out.msg.as_deref(), Some("E: Unable to locate package nosuch"));
    }
}
