// Stagehand - lightweight remote configuration orchestrator
//
// Stages a small module runner onto each target, invokes built-in modules
// through a JSON process boundary and reports per-host results.

pub mod executor;
pub mod inventory;
pub mod modules;
pub mod output;
pub mod parser;

pub use executor::{Executor, HostReport, RunConfig, RunReport, TaskReport};
pub use inventory::{Host, Inventory};
pub use modules::{BuiltinCatalog, ModuleCatalog, Outcome};
pub use output::{OutputFormat, OutputWriter, StagehandError};
pub use parser::{load_playbooks, parse_playbook, parse_playbook_file, Play, Playbook, Task};

/// Version of the Stagehand tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
