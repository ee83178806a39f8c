// SSH connection management

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use ssh2::{KeyboardInteractivePrompt, Session};

use super::{Connection, ExecutionResult, PlatformProfile};
use crate::inventory::Host;
use crate::output::errors::StagehandError;

/// An authenticated SSH session bound to one host
///
/// ssh2 is blocking, so every call runs on the blocking thread pool with a
/// cloned handle to the session.
pub struct SshConnection {
    session: Session,
    host_name: String,
    platform: PlatformProfile,
    secret: Option<String>,
}

impl SshConnection {
    /// Connect, authenticate and probe the target's OS family
    pub async fn open(host: &Host, secret: Option<String>) -> Result<Self, StagehandError> {
        let target = host.clone();
        let session = tokio::task::spawn_blocking(move || connect(&target))
            .await
            .map_err(|e| StagehandError::Connect {
                host: host.name.clone(),
                message: format!("connection task failed: {}", e),
            })??;

        let mut conn = SshConnection {
            session,
            host_name: host.name.clone(),
            platform: PlatformProfile::Unix,
            secret,
        };

        let probe = conn.exec(conn.platform.probe_command(), false).await;
        conn.platform = PlatformProfile::from_probe(probe.returncode, &probe.stdout);
        tracing::debug!(
            host = %conn.host_name,
            platform = %conn.platform,
            "detected target platform"
        );

        Ok(conn)
    }
}

/// Create a new SSH session
fn connect(host: &Host) -> Result<Session, StagehandError> {
    let connect_err = |message: String| StagehandError::Connect {
        host: host.name.clone(),
        message,
    };

    let address = (host.ip.as_str(), host.port)
        .to_socket_addrs()
        .map_err(|e| connect_err(format!("cannot resolve {}: {}", host.ip, e)))?
        .next()
        .ok_or_else(|| connect_err(format!("no address found for {}", host.ip)))?;

    // TCP connection with timeout
    let tcp = TcpStream::connect_timeout(&address, host.timeout)
        .map_err(|e| connect_err(format!("connection failed: {}", e)))?;

    let mut session =
        Session::new().map_err(|e| connect_err(format!("failed to create SSH session: {}", e)))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(host.timeout.as_millis().min(u32::MAX as u128) as u32);

    session
        .handshake()
        .map_err(|e| connect_err(format!("SSH handshake failed: {}", e)))?;

    let user = host
        .username
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "root".to_string());

    authenticate(&session, host, &user).map_err(connect_err)?;

    // Module runs may legitimately outlast the connect timeout
    session.set_timeout(0);
    Ok(session)
}

/// Key file if configured, otherwise password, otherwise the SSH agent
fn authenticate(session: &Session, host: &Host, user: &str) -> Result<(), String> {
    if let Some(ref key_path) = host.key_path {
        let key = expand_home(key_path);
        return session
            .userauth_pubkey_file(user, None, &key, None)
            .map_err(|e| format!("key authentication with {} failed: {}", key.display(), e));
    }

    if let Some(ref password) = host.password {
        if session.userauth_password(user, password).is_ok() {
            return Ok(());
        }
        // Fall back to keyboard-interactive auth (used by some PAM configurations)
        let mut prompter = PasswordPrompter(password.clone());
        return session
            .userauth_keyboard_interactive(user, &mut prompter)
            .map_err(|e| format!("password authentication failed for {}: {}", user, e));
    }

    let mut agent = session
        .agent()
        .map_err(|e| format!("no credentials configured and SSH agent unavailable: {}", e))?;
    agent
        .connect()
        .map_err(|e| format!("no credentials configured and SSH agent unavailable: {}", e))?;
    agent.list_identities().ok();
    for identity in agent.identities().unwrap_or_default() {
        if agent.userauth(user, &identity).is_ok() {
            return Ok(());
        }
    }
    Err(format!("authentication failed for {}", user))
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => Path::new(&home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Pause between polls while a command produces no output
const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn run_channel(
    session: &Session,
    command: &str,
    secret: Option<&str>,
) -> Result<ExecutionResult, String> {
    let mut channel = session
        .channel_session()
        .map_err(|e| format!("failed to open channel: {}", e))?;
    channel
        .exec(command)
        .map_err(|e| format!("failed to execute command: {}", e))?;

    if let Some(secret) = secret {
        channel
            .write_all(format!("{}\n", secret).as_bytes())
            .and_then(|_| channel.flush())
            .map_err(|e| format!("failed to write elevation secret: {}", e))?;
    }
    channel.send_eof().ok();

    session.set_blocking(false);
    let mut out = channel.stream(0);
    let mut err = channel.stderr();
    let drained = drain_streams(&mut out, &mut err, || std::thread::sleep(POLL_INTERVAL));
    session.set_blocking(true);
    let (stdout, stderr) =
        drained.map_err(|e| format!("failed to read command output: {}", e))?;

    channel.wait_close().ok();
    let returncode = channel.exit_status().unwrap_or(-1);

    Ok(ExecutionResult {
        stdout,
        stderr,
        returncode,
    })
}

/// Read stdout and stderr to EOF together
///
/// The remote side stalls once either stream's window fills, so both are
/// polled in turn. `idle` runs whenever neither had anything to read.
fn drain_streams<O, E>(
    stdout: &mut O,
    stderr: &mut E,
    mut idle: impl FnMut(),
) -> std::io::Result<(String, String)>
where
    O: Read,
    E: Read,
{
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut out_open = true;
    let mut err_open = true;
    let mut buf = [0u8; 8192];

    while out_open || err_open {
        let mut progressed = false;
        if out_open {
            progressed |= poll_into(stdout, &mut buf, &mut out, &mut out_open)?;
        }
        if err_open {
            progressed |= poll_into(stderr, &mut buf, &mut err, &mut err_open)?;
        }
        if !progressed {
            idle();
        }
    }

    Ok((
        String::from_utf8_lossy(&out).into_owned(),
        String::from_utf8_lossy(&err).into_owned(),
    ))
}

/// One non-blocking read; returns whether anything happened
fn poll_into(
    reader: &mut impl Read,
    buf: &mut [u8],
    sink: &mut Vec<u8>,
    open: &mut bool,
) -> std::io::Result<bool> {
    match reader.read(buf) {
        Ok(0) => {
            *open = false;
            Ok(true)
        }
        Ok(n) => {
            sink.extend_from_slice(&buf[..n]);
            Ok(true)
        }
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(false),
        Err(e) => Err(e),
    }
}

fn upload(session: &Session, local: &Path, remote: &str) -> Result<(), String> {
    let content =
        std::fs::read(local).map_err(|e| format!("failed to read {}: {}", local.display(), e))?;
    let sftp = session
        .sftp()
        .map_err(|e| format!("failed to open SFTP: {}", e))?;
    let mut remote_file = sftp
        .create(Path::new(remote))
        .map_err(|e| format!("failed to create remote file {}: {}", remote, e))?;
    remote_file
        .write_all(&content)
        .map_err(|e| format!("failed to write remote file {}: {}", remote, e))
}

/// Helper for keyboard-interactive authentication
struct PasswordPrompter(String);

impl KeyboardInteractivePrompt for PasswordPrompter {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.0.clone()).collect()
    }
}

#[async_trait]
impl Connection for SshConnection {
    async fn exec(&self, command: &str, elevate: bool) -> ExecutionResult {
        let command = if elevate {
            self.platform.elevate(command)
        } else {
            command.to_string()
        };
        let secret = self.secret.clone().filter(|_| elevate);
        let session = self.session.clone();

        let joined = tokio::task::spawn_blocking(move || {
            run_channel(&session, &command, secret.as_deref())
        })
        .await;

        match joined {
            Ok(Ok(result)) => result,
            Ok(Err(message)) => ExecutionResult::transport_error(message),
            Err(e) => ExecutionResult::transport_error(format!("ssh task failed: {}", e)),
        }
    }

    async fn copy_file(&self, local: &Path, remote: &str) -> ExecutionResult {
        let session = self.session.clone();
        let local = local.to_path_buf();
        let remote = remote.to_string();

        let joined = tokio::task::spawn_blocking(move || upload(&session, &local, &remote)).await;
        match joined {
            Ok(Ok(())) => ExecutionResult::ok(),
            Ok(Err(message)) => ExecutionResult {
                stdout: String::new(),
                stderr: message,
                returncode: 1,
            },
            Err(e) => ExecutionResult::transport_error(format!("ssh task failed: {}", e)),
        }
    }

    async fn make_dir(&self, path: &str) -> ExecutionResult {
        let command = self.platform.make_dir(path);
        self.exec(&command, false).await
    }

    fn platform(&self) -> PlatformProfile {
        self.platform
    }

    fn host_name(&self) -> &str {
        &self.host_name
    }

    async fn close(&self) {
        let session = self.session.clone();
        let host = self.host_name.clone();
        let closed = tokio::task::spawn_blocking(move || {
            session.disconnect(None, "closing", None)
        })
        .await;
        if let Ok(Err(e)) = closed {
            tracing::debug!(host = %host, "ssh disconnect failed: {}", e);
        }
    }
}
