// Data model for playbooks: ordered plays of ordered tasks

use serde_json::{Map, Value};

use crate::modules::Params;

/// An ordered sequence of plays, concatenated in file-then-document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playbook {
    pub plays: Vec<Play>,
}

impl Playbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_play(mut self, play: Play) -> Self {
        self.plays.push(play);
        self
    }

    /// Append the plays of another playbook after ours
    pub fn extend(&mut self, other: Playbook) {
        self.plays.extend(other.plays);
    }

    pub fn task_count(&self) -> usize {
        self.plays.iter().map(|p| p.tasks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.task_count() == 0
    }
}

/// A named list of tasks sharing variables and a default elevation flag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Play {
    pub name: String,
    /// Kept with the play; not substituted into task arguments
    pub vars: Map<String, Value>,
    pub tasks: Vec<Task>,
    /// Default privilege escalation for all tasks
    pub sudo: bool,
}

impl Play {
    pub fn new(name: impl Into<String>) -> Self {
        Play {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }
}

/// A single module invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub name: String,
    pub module: String,
    pub args: Params,
    /// Override sudo for this task (None = use play default)
    pub sudo: Option<bool>,
    /// Name under which the task report is kept on the host
    pub register: Option<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Task {
            name: name.into(),
            module: module.into(),
            args: Params::new(),
            sudo: None,
            register: None,
        }
    }

    pub fn with_args(mut self, args: Params) -> Self {
        self.args = args;
        self
    }

    pub fn with_arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.args.insert(key.to_string(), value.into());
        self
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = Some(sudo);
        self
    }

    pub fn with_register(mut self, name: impl Into<String>) -> Self {
        self.register = Some(name.into());
        self
    }

    /// Effective elevation given the owning play's default
    pub fn elevate(&self, play_default: bool) -> bool {
        self.sudo.unwrap_or(play_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_inherits_play_sudo() {
        let plain = Task::new("a", "debug");
        let forced_off = Task::new("b", "debug").with_sudo(false);
        let forced_on = Task::new("c", "debug").with_sudo(true);

        assert!(plain.elevate(true));
        assert!(!plain.elevate(false));
        assert!(!forced_off.elevate(true));
        assert!(forced_on.elevate(false));
    }

    #[test]
    fn test_playbook_counts() {
        let mut book = Playbook::new().with_play(
            Play::new("one")
                .with_task(Task::new("t1", "debug"))
                .with_task(Task::new("t2", "ping")),
        );
        book.extend(
            Playbook::new().with_play(Play::new("two").with_task(Task::new("t3", "debug"))),
        );

        assert_eq!(book.plays.len(), 2);
        assert_eq!(book.task_count(), 3);
        assert!(!book.is_empty());
        assert!(Playbook::new().is_empty());
    }
}
