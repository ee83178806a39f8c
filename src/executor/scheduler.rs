// Parallel host scheduler

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::Instrument;

use super::environment::SHIM_NAME;
use super::{Connection, Connector, Environment, PlatformProfile, SessionConnector, TaskReport};
use crate::inventory::{Host, Inventory};
use crate::modules::{ModuleCatalog, Outcome, Params};
use crate::output::errors::StagehandError;
use crate::output::OutputWriter;
use crate::parser::ast::{Play, Playbook, Task};

/// Run-wide settings handed to connectors and environments
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum concurrent hosts
    pub forks: usize,
    /// Overrides each host's connect timeout
    pub connect_timeout: Option<Duration>,
    /// Directory the staging root is created in; the remote home when unset
    pub staging_base: Option<String>,
    /// Controller-side module runner binaries, one per target family
    ///
    /// The controller's own family falls back to the runner next to the
    /// running executable; other families must be listed.
    pub shims: HashMap<PlatformProfile, PathBuf>,
    /// Use the login password as the elevation secret when a host has none
    pub sudo_password_from_login: bool,
    /// User for hosts that do not name one
    pub default_user: Option<String>,
    pub password: Option<String>,
    pub private_key: Option<String>,
    /// Elevate every task
    pub sudo: bool,
    pub sudo_password: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            forks: 10,
            connect_timeout: None,
            staging_base: None,
            shims: HashMap::new(),
            sudo_password_from_login: false,
            default_user: None,
            password: None,
            private_key: None,
            sudo: false,
            sudo_password: None,
        }
    }
}

impl RunConfig {
    pub fn with_shim(mut self, platform: PlatformProfile, path: impl Into<PathBuf>) -> Self {
        self.shims.insert(platform, path.into());
        self
    }

    /// Module runner to stage on `platform` targets, if one is known
    pub fn shim_for(&self, platform: PlatformProfile) -> Option<PathBuf> {
        if let Some(path) = self.shims.get(&platform) {
            return Some(path.clone());
        }
        if platform != PlatformProfile::controller() {
            return None;
        }
        let dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        Some(dir.join(format!("{}{}", SHIM_NAME, platform.exe_suffix())))
    }

    /// Secret piped to the elevation prompt for `host`
    ///
    /// The command-line secret wins, then the host's own, then (if enabled)
    /// the host's login password.
    pub fn elevation_secret(&self, host: &Host) -> Option<String> {
        self.sudo_password
            .clone()
            .or_else(|| host.sudo_password.clone())
            .or_else(|| {
                if self.sudo_password_from_login {
                    host.password.clone()
                } else {
                    None
                }
            })
    }
}

/// Everything that happened on one host
#[derive(Debug)]
pub struct HostReport {
    pub host: String,
    pub tasks: Vec<TaskReport>,
    /// Fatal error that stopped this host, if any
    pub error: Option<StagehandError>,
    pub duration: Duration,
}

impl HostReport {
    fn count(&self, outcome: Outcome) -> usize {
        self.tasks.iter().filter(|t| t.outcome == outcome).count()
    }

    pub fn ok_count(&self) -> usize {
        self.count(Outcome::Ok)
    }

    pub fn changed_count(&self) -> usize {
        self.count(Outcome::Changed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(Outcome::Failed)
    }

    /// True when the host hit a fatal error or any task failed
    pub fn failed(&self) -> bool {
        self.error.is_some() || self.failed_count() > 0
    }

    /// The last report registered under `name`
    pub fn registered(&self, name: &str) -> Option<&TaskReport> {
        self.tasks
            .iter()
            .rev()
            .find(|t| t.register.as_deref() == Some(name))
    }
}

/// Per-host results of one run, in inventory order
#[derive(Debug, Default)]
pub struct RunReport {
    pub hosts: Vec<HostReport>,
    pub duration: Duration,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.hosts.iter().all(|h| !h.failed())
    }

    pub fn host(&self, name: &str) -> Option<&HostReport> {
        self.hosts.iter().find(|h| h.host == name)
    }

    pub fn total_failed(&self) -> usize {
        self.hosts.iter().map(HostReport::failed_count).sum()
    }

    pub fn total_changed(&self) -> usize {
        self.hosts.iter().map(HostReport::changed_count).sum()
    }

    /// Hosts that never got to run their tasks to the end
    pub fn aborted(&self) -> impl Iterator<Item = &HostReport> {
        self.hosts.iter().filter(|h| h.error.is_some())
    }

    /// Hosts that could not be connected to
    pub fn unreachable(&self) -> impl Iterator<Item = &HostReport> {
        self.hosts
            .iter()
            .filter(|h| matches!(h.error, Some(StagehandError::Connect { .. })))
    }
}

/// Runs playbooks against inventory targets, one isolated worker per host
pub struct Executor {
    inventory: Inventory,
    catalog: Arc<dyn ModuleCatalog>,
    config: RunConfig,
    connector: Arc<dyn Connector>,
    output: Arc<Mutex<OutputWriter>>,
}

impl Executor {
    pub fn new(inventory: Inventory, catalog: Arc<dyn ModuleCatalog>, config: RunConfig) -> Self {
        Executor {
            inventory,
            catalog,
            connector: Arc::new(SessionConnector::new(config.clone())),
            config,
            output: Arc::new(Mutex::new(OutputWriter::silent())),
        }
    }

    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    pub fn with_output(mut self, output: Arc<Mutex<OutputWriter>>) -> Self {
        self.output = output;
        self
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn resolve_target(&self, name: &str) -> Result<Vec<Host>, StagehandError> {
        self.inventory.resolve(name)
    }

    /// Run every play of `playbook` on every host of `target`
    pub async fn run_playbook(
        &self,
        target: &str,
        playbook: &Playbook,
    ) -> Result<RunReport, StagehandError> {
        let hosts = self.resolve_target(target)?;
        self.output
            .lock()
            .print_run_header(target, hosts.len(), playbook.task_count());
        Ok(self.run_hosts(hosts, Arc::new(playbook.clone()), self.config.sudo).await)
    }

    /// Run a single module ad hoc on every host of `target`
    ///
    /// Arguments are checked against the module's argument spec before any
    /// host is contacted.
    pub async fn run_module(
        &self,
        target: &str,
        module: &str,
        elevate: bool,
        args: Params,
    ) -> Result<RunReport, StagehandError> {
        self.catalog.argument_spec(module)?.validate(module, &args)?;
        let hosts = self.resolve_target(target)?;

        let playbook = Playbook::new().with_play(
            Play::new(format!("ad-hoc {}", module))
                .with_task(Task::new(module, module).with_args(args).with_sudo(elevate)),
        );
        self.output.lock().print_run_header(target, hosts.len(), 1);
        Ok(self.run_hosts(hosts, Arc::new(playbook), self.config.sudo).await)
    }

    async fn run_hosts(
        &self,
        hosts: Vec<Host>,
        playbook: Arc<Playbook>,
        force_sudo: bool,
    ) -> RunReport {
        let started = Instant::now();
        let semaphore = Semaphore::new(self.config.forks.max(1));

        let workers = hosts.into_iter().map(|host| {
            let semaphore = &semaphore;
            let playbook = playbook.clone();
            async move {
                let _permit = semaphore.acquire().await.ok();
                let report = self.run_host(host, playbook, force_sudo).await;
                self.output.lock().print_host_report(&report);
                report
            }
        });

        let report = RunReport {
            hosts: join_all(workers).await,
            duration: started.elapsed(),
        };
        self.output.lock().print_recap(&report);
        report
    }

    async fn run_host(&self, host: Host, playbook: Arc<Playbook>, force_sudo: bool) -> HostReport {
        let started = Instant::now();
        let span = tracing::info_span!("host", host = %host.name);

        async move {
            let (tasks, result) = self.drive(&host, playbook, force_sudo).await;
            let error = result.err();
            if let Some(ref e) = error {
                tracing::warn!("host aborted: {}", e);
            }
            HostReport {
                host: host.name,
                tasks,
                error,
                duration: started.elapsed(),
            }
        }
        .instrument(span)
        .await
    }

    /// Open the connection, run the playbook inside a scoped environment, close
    async fn drive(
        &self,
        host: &Host,
        playbook: Arc<Playbook>,
        force_sudo: bool,
    ) -> (Vec<TaskReport>, Result<(), StagehandError>) {
        let conn = match self.connector.open(host).await {
            Ok(conn) => conn,
            Err(e) => return (Vec::new(), Err(e)),
        };

        let outcome = self.stage_and_play(conn.as_ref(), playbook, force_sudo).await;
        conn.close().await;
        outcome
    }

    async fn stage_and_play(
        &self,
        conn: &dyn Connection,
        playbook: Arc<Playbook>,
        force_sudo: bool,
    ) -> (Vec<TaskReport>, Result<(), StagehandError>) {
        let env = match Environment::init(conn, self.catalog.as_ref(), &self.config).await {
            Ok(env) => env,
            Err(e) => return (Vec::new(), Err(e)),
        };

        env.scoped(move |env| {
            async move {
                let mut reports = Vec::new();
                let result = playbook.play(env, force_sudo, &mut reports).await;
                (reports, result)
            }
            .boxed()
        })
        .await
    }
}
