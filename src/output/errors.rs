// Error taxonomy for Stagehand

use std::path::PathBuf;

use thiserror::Error;

/// All error types in Stagehand
///
/// Host-scoped errors (`NotFound`, `Connect`, `Environment`) are caught at the
/// executor's per-host boundary and reported; they never abort sibling hosts.
/// A module reporting `failed: true` is not an error at all, it is task data.
#[derive(Debug, Error)]
pub enum StagehandError {
    /// Name is neither a known host nor a known group
    #[error("no such host or group: {name}")]
    NotFound { name: String },

    /// Authentication, timeout or unreachable target
    #[error("failed to connect to {host}: {message}")]
    Connect { host: String, message: String },

    /// Staging directory creation or payload transfer failed
    #[error("failed to prepare staging environment on {host}: {message}")]
    Environment { host: String, message: String },

    /// Module output was not the single JSON object the protocol requires
    #[error("module output is not a JSON object: {message}")]
    ModuleProtocol { message: String, raw: String },

    /// Inventory or playbook document could not be parsed
    #[error("{}: {message}", source_name(file))]
    Parse {
        file: Option<PathBuf>,
        message: String,
    },

    /// Module identifier missing from the catalog
    #[error("unknown module: {name}")]
    UnknownModule { name: String },

    /// Arguments rejected by a module's argument specification
    #[error("invalid arguments for module {module}: {message}")]
    InvalidArguments { module: String, message: String },

    /// Local I/O errors
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StagehandError {
    pub fn parse(file: Option<PathBuf>, message: impl Into<String>) -> Self {
        StagehandError::Parse {
            file,
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StagehandError::Io {
            path: path.into(),
            source,
        }
    }

    /// A short remediation hint shown under the error, if one applies
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            StagehandError::NotFound { .. } => {
                Some("Check the target name against your inventory groups and hosts")
            }
            StagehandError::Connect { .. } => {
                Some("Check network reachability, the SSH port and the inventory credentials")
            }
            StagehandError::Environment { .. } => {
                Some("Ensure the connecting user can write to its home directory")
            }
            StagehandError::ModuleProtocol { .. } => {
                Some("The module runner printed unexpected output; check stderr for details")
            }
            StagehandError::UnknownModule { .. } => {
                Some("Run `stagehand modules` to list the available modules")
            }
            StagehandError::Parse { .. }
            | StagehandError::InvalidArguments { .. }
            | StagehandError::Io { .. } => None,
        }
    }

    /// Whether this error ends the run for a single host only
    pub fn is_host_scoped(&self) -> bool {
        matches!(
            self,
            StagehandError::NotFound { .. }
                | StagehandError::Connect { .. }
                | StagehandError::Environment { .. }
        )
    }

    /// Short label for a host this error stopped, as shown in reports
    pub fn host_status(&self) -> &'static str {
        match self {
            StagehandError::Connect { .. } => "unreachable",
            StagehandError::Environment { .. } => "staging_failed",
            _ => "error",
        }
    }
}

fn source_name(file: &Option<PathBuf>) -> String {
    match file {
        Some(path) => path.display().to_string(),
        None => "<inline>".to_string(),
    }
}

pub type Result<T, E = StagehandError> = std::result::Result<T, E>;
