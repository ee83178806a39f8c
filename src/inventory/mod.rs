// Inventory module for host management

mod static_inv;

pub use static_inv::HostParams;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::output::errors::StagehandError;

/// Name of the root group that implicitly contains every host
pub const ROOT_GROUP: &str = "all";

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A single host in the inventory
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub name: String,
    /// Network address; defaults to the host name
    pub ip: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub key_path: Option<String>,
    pub port: u16,
    pub timeout: Duration,
    /// Secret fed to the elevation prompt
    pub sudo_password: Option<String>,
}

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Host {
            ip: name.clone(),
            name,
            username: None,
            password: None,
            key_path: None,
            port: DEFAULT_SSH_PORT,
            timeout: DEFAULT_TIMEOUT,
            sudo_password: None,
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sudo_password(mut self, secret: impl Into<String>) -> Self {
        self.sudo_password = Some(secret.into());
        self
    }

    /// Check if this host should use a local channel instead of SSH
    pub fn is_local(&self) -> bool {
        matches!(self.ip.as_str(), "localhost" | "127.0.0.1" | "::1")
    }

    /// Get the SSH connection string (user@host:port)
    pub fn ssh_target(&self) -> String {
        match &self.username {
            Some(user) => format!("{}@{}:{}", user, self.ip, self.port),
            None => format!("{}:{}", self.ip, self.port),
        }
    }

    /// Overwrite every field the params actually set
    ///
    /// Nothing is changed when a value is out of range.
    pub fn apply(&mut self, params: &HostParams) -> Result<(), StagehandError> {
        let timeout = match params.timeout {
            Some(secs) => Some(Duration::try_from_secs_f64(secs).map_err(|_| {
                StagehandError::parse(
                    None,
                    format!(
                        "host '{}': timeout must be a non-negative number of seconds, got {}",
                        self.name, secs
                    ),
                )
            })?),
            None => None,
        };

        if let Some(ref ip) = params.ip {
            self.ip = ip.clone();
        }
        if let Some(ref username) = params.username {
            self.username = Some(username.clone());
        }
        if let Some(ref password) = params.password {
            self.password = Some(password.clone());
        }
        if let Some(ref key_path) = params.key_path {
            self.key_path = Some(key_path.clone());
        }
        if let Some(port) = params.port {
            self.port = port;
        }
        if let Some(timeout) = timeout {
            self.timeout = timeout;
        }
        if let Some(ref secret) = params.sudo_password {
            self.sudo_password = Some(secret.clone());
        }
        Ok(())
    }
}

/// The complete inventory: a flat host registry plus a flattened group index
#[derive(Debug, Clone)]
pub struct Inventory {
    hosts: HashMap<String, Host>,
    host_order: Vec<String>,
    groups: HashMap<String, Vec<String>>,
    group_order: Vec<String>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    pub fn new() -> Self {
        let mut inv = Inventory {
            hosts: HashMap::new(),
            host_order: Vec::new(),
            groups: HashMap::new(),
            group_order: Vec::new(),
        };
        // Always have an "all" group
        inv.ensure_group(ROOT_GROUP);
        inv
    }

    /// Load and merge inventory documents in order
    pub fn load<P: AsRef<Path>>(sources: &[P]) -> Result<Self, StagehandError> {
        let mut inv = Inventory::new();
        for source in sources {
            inv.load_file(source.as_ref())?;
        }
        Ok(inv)
    }

    /// Merge one more inventory document into this inventory
    pub fn load_file(&mut self, path: &Path) -> Result<(), StagehandError> {
        let content = std::fs::read_to_string(path).map_err(|e| StagehandError::io(path, e))?;
        self.merge_str(&content, Some(path))
    }

    /// Add a host, merging with an existing host of the same name
    pub fn add_host(&mut self, host: Host) {
        let name = host.name.clone();
        if !self.hosts.contains_key(&name) {
            self.host_order.push(name.clone());
        }
        self.hosts.insert(name.clone(), host);
        self.add_member(ROOT_GROUP, &name);
    }

    /// Add `host_name` to `group`, creating the group if needed
    pub fn add_member(&mut self, group: &str, host_name: &str) {
        self.ensure_group(group);
        if let Some(members) = self.groups.get_mut(group) {
            if !members.iter().any(|m| m == host_name) {
                members.push(host_name.to_string());
            }
        }
    }

    pub(crate) fn ensure_group(&mut self, group: &str) {
        if !self.groups.contains_key(group) {
            self.groups.insert(group.to_string(), Vec::new());
            self.group_order.push(group.to_string());
        }
    }

    pub(crate) fn upsert_host(
        &mut self,
        name: &str,
        params: &HostParams,
    ) -> Result<(), StagehandError> {
        match self.hosts.get_mut(name) {
            Some(existing) => existing.apply(params)?,
            None => {
                let mut host = Host::new(name);
                host.apply(params)?;
                self.add_host(host);
            }
        }
        Ok(())
    }

    pub fn is_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// Resolve a group or host name to concrete hosts
    ///
    /// A name present in the group index is always treated as a group.
    pub fn resolve(&self, name: &str) -> Result<Vec<Host>, StagehandError> {
        if let Some(members) = self.groups.get(name) {
            return Ok(members
                .iter()
                .filter_map(|m| self.hosts.get(m))
                .cloned()
                .collect());
        }

        self.hosts
            .get(name)
            .map(|h| vec![h.clone()])
            .ok_or_else(|| StagehandError::NotFound {
                name: name.to_string(),
            })
    }

    /// Get a single host by name
    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    /// All hosts in registration order
    pub fn all_hosts(&self) -> Vec<&Host> {
        self.host_order
            .iter()
            .filter_map(|n| self.hosts.get(n))
            .collect()
    }

    /// Get all group names in registration order
    pub fn group_names(&self) -> Vec<&str> {
        self.group_order.iter().map(|s| s.as_str()).collect()
    }

    /// Flattened member names of a group
    pub fn group_members(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(|m| m.as_slice())
    }

    /// Get the total number of hosts
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Inventory hosts={} groups={}>",
            self.hosts.len(),
            self.groups.len()
        )
    }
}
