// Executor module - connections, staging and per-host task execution

use std::path::Path;

use async_trait::async_trait;

use crate::inventory::Host;
use crate::output::errors::StagehandError;

pub mod environment;
pub mod local;
pub mod platform;
pub mod runner;
pub mod scheduler;
pub mod ssh;

pub use environment::Environment;
pub use local::LocalConnection;
pub use platform::PlatformProfile;
pub use runner::{TaskReport, TaskState};
pub use scheduler::{Executor, HostReport, RunConfig, RunReport};
pub use ssh::SshConnection;

/// Result of every connection primitive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.returncode == 0
    }

    /// A transport-level failure surfaced as a failed command
    pub fn transport_error(message: impl Into<String>) -> Self {
        ExecutionResult {
            stdout: String::new(),
            stderr: message.into(),
            returncode: -1,
        }
    }

    pub fn ok() -> Self {
        ExecutionResult::default()
    }

    /// stderr if non-empty, otherwise stdout, trimmed
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Common trait for all connection types (SSH, local)
///
/// Command failures never surface as `Err`: a connection reports them through
/// a non-zero `returncode`.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a shell command, optionally elevated
    async fn exec(&self, command: &str, elevate: bool) -> ExecutionResult;

    /// Copy a controller-side file to the target
    async fn copy_file(&self, local: &Path, remote: &str) -> ExecutionResult;

    /// Create a directory (and parents) on the target
    async fn make_dir(&self, path: &str) -> ExecutionResult;

    /// OS family detected when the connection was opened
    fn platform(&self) -> PlatformProfile;

    fn host_name(&self) -> &str;

    /// Release the underlying channel or session
    async fn close(&self);

    fn join_path(&self, segments: &[&str]) -> String {
        self.platform().join(segments)
    }
}

/// Opens connections for hosts
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, host: &Host) -> Result<Box<dyn Connection>, StagehandError>;
}

/// Binds loopback hosts to a local channel and everything else to SSH
pub struct SessionConnector {
    config: RunConfig,
}

impl SessionConnector {
    pub fn new(config: RunConfig) -> Self {
        SessionConnector { config }
    }

    /// The host with run-wide credential overrides applied
    fn effective_host(&self, host: &Host) -> Host {
        let mut host = host.clone();
        if host.username.is_none() {
            host.username = self.config.default_user.clone();
        }
        if let Some(ref password) = self.config.password {
            host.password = Some(password.clone());
        }
        if let Some(ref key) = self.config.private_key {
            host.key_path = Some(key.clone());
        }
        if let Some(timeout) = self.config.connect_timeout {
            host.timeout = timeout;
        }
        host
    }
}

#[async_trait]
impl Connector for SessionConnector {
    async fn open(&self, host: &Host) -> Result<Box<dyn Connection>, StagehandError> {
        let host = self.effective_host(host);
        let secret = self.config.elevation_secret(&host);

        if host.is_local() {
            tracing::debug!(host = %host.name, "using local channel");
            return Ok(Box::new(LocalConnection::new(&host.name).with_secret(secret)));
        }

        tracing::debug!(host = %host.name, target = %host.ssh_target(), "opening ssh session");
        let conn = SshConnection::open(&host, secret).await?;
        Ok(Box::new(conn))
    }
}
