// User module - manage system users

use super::{
    command_failure, param_str, ArgSpec, ArgumentSpec, Module, ModuleOutput, Params, System,
};

pub struct UserModule;

impl Module for UserModule {
    fn name(&self) -> &'static str {
        "user"
    }

    fn description(&self) -> &'static str {
        "Create or delete a local user account"
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

        let exists = system.run("id", &[name]).success();

        let (program, args, done): (&str, Vec<&str>, &str) = match (state, exists) {
            ("absent", false) => {
                return ModuleOutput::ok().with_msg(format!("User {} already absent", name))
            }
            ("absent", true) => ("userdel", vec!["-r", name], "deleted"),
            (_, true) => {
                return ModuleOutput::ok().with_msg(format!("User {} already exists", name))
            }
            (_, false) => ("useradd", vec![name], "created"),
        };

        let result = system.run(program, &args);
        if result.success() {
            ModuleOutput::changed().with_msg(format!("User {} {}", name, done))
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
    fn test_create_missing_user() {
        let system = FakeSystem::new().respond("id deploy", 1, "", "no such user");
        let out = UserModule.run(&params(json!({"name": "deploy", "state": "present"})), &system);

        assert!(out.changed);
        assert_eq!(out.msg.as_deref(), Some("User deploy created"));
        assert_eq!(system.calls(), vec!["id deploy", "useradd deploy"]);
    }

    #[test]
    fn test_existing_user_unchanged() {
        let system = FakeSystem::new();
        let out = UserModule.run(&params(json!({"name": "deploy", "state": "present"})), &system);
        assert!(!out.changed);
    }

    #[test]
    fn test_delete_user() {
        let system = FakeSystem::new();
        let out = UserModule.run(&params(json!({"name": "deploy", "state": "absent"})), &system);
        assert!(out.changed);
        assert_eq!(system.calls().last().unwrap(), "userdel -r deploy");
    }
}
