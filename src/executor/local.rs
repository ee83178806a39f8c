// Local command execution without SSH

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

use super::{Connection, ExecutionResult, PlatformProfile};

/// Local connection for executing commands on the controller itself
pub struct LocalConnection {
    host_name: String,
    platform: PlatformProfile,
    secret: Option<String>,
}

impl LocalConnection {
    /// Create a new local connection
    pub fn new(host_name: impl Into<String>) -> Self {
        LocalConnection {
            host_name: host_name.into(),
            platform: PlatformProfile::controller(),
            secret: None,
        }
    }

    /// Secret written to the elevation prompt on stdin
    pub fn with_secret(mut self, secret: Option<String>) -> Self {
        self.secret = secret;
        self
    }

    fn shell(&self, command: &str) -> Command {
        let mut cmd = match self.platform {
            PlatformProfile::Unix => {
                let mut c = Command::new("sh");
                c.arg("-c").arg(command);
                c
            }
            PlatformProfile::Windows => {
                let mut c = Command::new("cmd");
                c.arg("/C").arg(command);
                c
            }
        };
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }
}

/// Answer an elevation prompt: the secret, a newline, then flush
async fn write_secret<W>(stdin: &mut W, secret: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stdin.write_all(secret.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

#[async_trait]
impl Connection for LocalConnection {
    async fn exec(&self, command: &str, elevate: bool) -> ExecutionResult {
        let command = if elevate {
            self.platform.elevate(command)
        } else {
            command.to_string()
        };

        let secret = self.secret.as_deref().filter(|_| elevate);
        let mut cmd = self.shell(&command);
        cmd.stdin(if secret.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionResult::transport_error(format!(
                    "failed to spawn local command: {}",
                    e
                ))
            }
        };

        if let (Some(secret), Some(mut stdin)) = (secret, child.stdin.take()) {
            if let Err(e) = write_secret(&mut stdin, secret).await {
                tracing::debug!(host = %self.host_name, "failed to write elevation secret: {}", e);
            }
        }

        match child.wait_with_output().await {
            Ok(output) => ExecutionResult {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                returncode: output.status.code().unwrap_or(-1),
            },
            Err(e) => {
                ExecutionResult::transport_error(format!("failed to wait for command: {}", e))
            }
        }
    }

    async fn copy_file(&self, local: &Path, remote: &str) -> ExecutionResult {
        match tokio::fs::copy(local, remote).await {
            Ok(_) => ExecutionResult::ok(),
            Err(e) => ExecutionResult {
                stdout: String::new(),
                stderr: format!("failed to copy {} to {}: {}", local.display(), remote, e),
                returncode: 1,
            },
        }
    }

    async fn make_dir(&self, path: &str) -> ExecutionResult {
        match tokio::fs::create_dir_all(path).await {
            Ok(()) => ExecutionResult::ok(),
            Err(e) => ExecutionResult {
                stdout: String::new(),
                stderr: format!("failed to create {}: {}", path, e),
                returncode: 1,
            },
        }
    }

    fn platform(&self) -> PlatformProfile {
        self.platform
    }

    fn host_name(&self) -> &str {
        &self.host_name
    }

    async fn close(&self) {
        tracing::debug!(host = %self.host_name, "closing local channel");
    }
}
