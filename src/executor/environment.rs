// Ephemeral staging area on a target host

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::Path;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

use super::{Connection, ExecutionResult, PlatformProfile, RunConfig};
use crate::modules::protocol::invoke_command;
use crate::modules::{ModuleCatalog, Params};
use crate::output::errors::StagehandError;

/// File name of the module runner inside the staging root
pub const SHIM_NAME: &str = "stagehand-module";

/// Prefix of every staging root directory
pub const ROOT_PREFIX: &str = ".stagehand_";

/// A staging directory on one connection: the shim plus staged module payloads
///
/// Created by [`Environment::init`], torn down by [`Environment::destroy`],
/// which consumes the environment so teardown happens at most once.
pub struct Environment<'c> {
    conn: &'c dyn Connection,
    catalog: &'c dyn ModuleCatalog,
    root: String,
    modules_dir: String,
    shim: String,
    staged: Mutex<HashSet<String>>,
}

impl<'c> Environment<'c> {
    /// Create the staging directories and copy the shim onto the target
    pub async fn init(
        conn: &'c dyn Connection,
        catalog: &'c dyn ModuleCatalog,
        config: &RunConfig,
    ) -> Result<Environment<'c>, StagehandError> {
        let platform = conn.platform();
        let local_shim = config.shim_for(platform).ok_or_else(|| StagehandError::Environment {
            host: conn.host_name().to_string(),
            message: format!("no module runner configured for {} targets", platform),
        })?;
        let base = match config.staging_base {
            Some(ref base) => base.clone(),
            None => Self::probe_home(conn).await?,
        };

        let root_name = format!("{}{}", ROOT_PREFIX, run_id());
        let shim_name = format!("{}{}", SHIM_NAME, platform.exe_suffix());
        let root = conn.join_path(&[base.as_str(), root_name.as_str()]);
        let modules_dir = conn.join_path(&[root.as_str(), "modules"]);
        let shim = conn.join_path(&[root.as_str(), shim_name.as_str()]);

        let env = Environment {
            conn,
            catalog,
            root,
            modules_dir,
            shim,
            staged: Mutex::new(HashSet::new()),
        };

        if let Err(e) = env.prepare(&local_shim).await {
            env.destroy().await;
            return Err(e);
        }

        tracing::debug!(host = %conn.host_name(), root = %env.root, "staging environment ready");
        Ok(env)
    }

    async fn probe_home(conn: &dyn Connection) -> Result<String, StagehandError> {
        let result = conn.exec(conn.platform().home_probe(), false).await;
        let home = result.stdout.trim();
        if !result.success() || home.is_empty() {
            return Err(StagehandError::Environment {
                host: conn.host_name().to_string(),
                message: format!("cannot determine home directory: {}", result.diagnostic()),
            });
        }
        Ok(home.to_string())
    }

    async fn prepare(&self, local_shim: &Path) -> Result<(), StagehandError> {
        let made = self.conn.make_dir(&self.modules_dir).await;
        self.check(made, "create staging directory")?;

        let copied = self.conn.copy_file(local_shim, &self.shim).await;
        self.check(copied, "copy module runner")?;

        if let Some(cmd) = self.platform().make_executable(&self.shim) {
            let marked = self.conn.exec(&cmd, false).await;
            self.check(marked, "mark module runner executable")?;
        }
        Ok(())
    }

    fn check(&self, result: ExecutionResult, step: &str) -> Result<(), StagehandError> {
        if result.success() {
            return Ok(());
        }
        Err(StagehandError::Environment {
            host: self.conn.host_name().to_string(),
            message: format!("failed to {}: {}", step, result.diagnostic()),
        })
    }

    /// Copy a module payload into the staging area once per environment
    pub async fn stage_module(&self, name: &str) -> Result<(), StagehandError> {
        if self.is_staged(name) {
            return Ok(());
        }

        let payload = self.catalog.payload(name)?;
        let result = self.conn.copy_file(&payload, &self.module_path(name)).await;
        self.check(result, &format!("stage module {}", name))?;

        self.staged.lock().insert(name.to_string());
        tracing::debug!(host = %self.conn.host_name(), module = name, "staged module");
        Ok(())
    }

    /// Run a staged module through the shim
    pub async fn invoke(&self, module: &str, args: &Params, elevate: bool) -> ExecutionResult {
        let cmd = invoke_command(self.platform(), &self.shim, &self.module_path(module), args);
        self.conn.exec(&cmd, elevate).await
    }

    /// Best-effort recursive removal of the staging root
    pub async fn destroy(self) {
        let cmd = self.platform().remove_dir_all(&self.root);
        let result = self.conn.exec(&cmd, false).await;
        if result.success() {
            tracing::debug!(
                host = %self.conn.host_name(),
                root = %self.root,
                "removed staging environment"
            );
        } else {
            tracing::warn!(
                host = %self.conn.host_name(),
                root = %self.root,
                "failed to remove staging environment: {}",
                result.diagnostic()
            );
        }
    }

    /// Run `work` against this environment, then destroy it
    ///
    /// Teardown also happens when `work` panics; the panic resumes afterwards.
    pub async fn scoped<T, F>(self, work: F) -> T
    where
        F: for<'e> FnOnce(&'e Environment<'c>) -> BoxFuture<'e, T>,
    {
        let outcome = AssertUnwindSafe(work(&self)).catch_unwind().await;
        self.destroy().await;
        match outcome {
            Ok(value) => value,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    pub fn platform(&self) -> PlatformProfile {
        self.conn.platform()
    }

    pub fn host_name(&self) -> &str {
        self.conn.host_name()
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn module_path(&self, name: &str) -> String {
        let file = format!("{}.json", name);
        self.conn.join_path(&[self.modules_dir.as_str(), file.as_str()])
    }

    pub fn is_staged(&self, name: &str) -> bool {
        self.staged.lock().contains(name)
    }
}

fn run_id() -> String {
    format!("{:08x}", rand::random::<u32>())
}


#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use super::testing::{Counters, RecordingConnection};
    use super::*;
    use crate::modules::BuiltinCatalog;

    fn config(base: &Path, shim: &Path) -> RunConfig {
        RunConfig {
            staging_base: Some(base.to_string_lossy().to_string()),
            ..RunConfig::default()
        }
        .with_shim(PlatformProfile::Unix, shim)
    }

    fn fake_shim(dir: &Path) -> std::path::PathBuf {
        let shim = dir.join("shim.sh");
        std::fs::write(&shim, "#!/bin/sh\necho '{\"changed\": false}'\n").unwrap();
        shim
    }

    #[tokio::test]
    async fn test_init_layout_and_destroy() {
        let base = tempfile::tempdir().unwrap();
        let shim = fake_shim(base.path());
        let counters = Arc::new(Counters::default());
        let conn = RecordingConnection::new(counters.clone());
        let catalog = BuiltinCatalog::new().unwrap();

        let env = Environment::init(&conn, &catalog, &config(base.path(), &shim)).await.unwrap();
        let root = std::path::PathBuf::from(env.root());
        assert!(root.file_name().unwrap().to_string_lossy().starts_with(ROOT_PREFIX));
        assert!(root.join("modules").is_dir());
        assert!(root.join(SHIM_NAME).is_file());

        env.stage_module("debug").await.unwrap();
        env.stage_module("debug").await.unwrap();
        assert!(env.is_staged("debug"));
        assert!(root.join("modules/debug.json").is_file());
        // shim plus a single payload copy
        assert_eq!(counters.copies(), 2);

        env.destroy().await;
        assert!(!root.exists());
        assert_eq!(counters.removals(), 1);
    }

    #[tokio::test]
    async fn test_failed_init_cleans_up() {
        let base = tempfile::tempdir().unwrap();
        let shim = fake_shim(base.path());
        let counters = Arc::new(Counters::default());
        let mut conn = RecordingConnection::new(counters.clone());
        conn.fail_copies = true;
        let catalog = BuiltinCatalog::new().unwrap();

        let err = Environment::init(&conn, &catalog, &config(base.path(), &shim))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StagehandError::Environment { .. }));
        assert!(err.to_string().contains("disk full"));
        assert_eq!(counters.removals(), 1);

        let leftovers: Vec<_> = std::fs::read_dir(base.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(ROOT_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_init_without_runner_for_platform() {
        let base = tempfile::tempdir().unwrap();
        let counters = Arc::new(Counters::default());
        let conn = RecordingConnection::new(counters.clone());
        let catalog = BuiltinCatalog::new().unwrap();
        let config = RunConfig {
            staging_base: Some(base.path().to_string_lossy().to_string()),
            ..RunConfig::default()
        }
        .with_shim(PlatformProfile::Windows, base.path().join("runner.exe"));

        let err = Environment::init(&conn, &catalog, &config).await.err().unwrap();
        assert!(matches!(err, StagehandError::Environment { ref host, .. } if host == "recorder"));
        assert!(err.to_string().contains("no module runner configured for unix targets"));
        assert_eq!(counters.copies(), 0);
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_scoped_destroys_once_on_success() {
        let base = tempfile::tempdir().unwrap();
        let shim = fake_shim(base.path());
        let counters = Arc::new(Counters::default());
        let conn = RecordingConnection::new(counters.clone());
        let catalog = BuiltinCatalog::new().unwrap();

        let env = Environment::init(&conn, &catalog, &config(base.path(), &shim)).await.unwrap();
        let root = std::path::PathBuf::from(env.root());
        let seen = env
            .scoped(|env| async move { env.root().to_string() }.boxed())
            .await;

        assert_eq!(std::path::PathBuf::from(seen), root);
        assert_eq!(counters.removals(), 1);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_scoped_destroys_when_work_panics() {
        let base = tempfile::tempdir().unwrap();
        let shim = fake_shim(base.path());
        let counters = Arc::new(Counters::default());
        let conn = RecordingConnection::new(counters.clone());
        let catalog = BuiltinCatalog::new().unwrap();

        let env = Environment::init(&conn, &catalog, &config(base.path(), &shim)).await.unwrap();
        let root = std::path::PathBuf::from(env.root());

        let caught = AssertUnwindSafe(env.scoped(|_env| {
            async move {
                panic!("task blew up");
            }
            .boxed()
        }))
        .catch_unwind()
        .await;

        assert!(caught.is_err());
        assert_eq!(counters.removals(), 1);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_invoke_runs_shim() {
        let base = tempfile::tempdir().unwrap();
        let shim = fake_shim(base.path());
        let counters = Arc::new(Counters::default());
        let conn = RecordingConnection::new(counters);
        let catalog = BuiltinCatalog::new().unwrap();

        let env = Environment::init(&conn, &catalog, &config(base.path(), &shim)).await.unwrap();
        env.stage_module("debug").await.unwrap();
        let result = env.invoke("debug", &Params::new(), false).await;
        assert!(result.success(), "stderr: {}", result.stderr);
        assert_eq!(result.stdout.trim(), "{\"changed\": false}");
        env.destroy().await;
    }
}
