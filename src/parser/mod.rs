// Parser module for playbooks and ad-hoc arguments

pub mod ast;
pub mod yaml;

pub use ast::{Play, Playbook, Task};
pub use yaml::{load_playbooks, parse_module_args, parse_playbook, parse_playbook_file};
