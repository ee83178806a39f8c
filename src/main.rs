// Stagehand CLI - lightweight remote configuration orchestrator

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use stagehand::executor::PlatformProfile;
use stagehand::modules::{registry, BuiltinCatalog};
use stagehand::output::{OutputFormat, OutputWriter, StagehandError};
use stagehand::parser::{load_playbooks, parse_module_args};
use stagehand::{Executor, Inventory, RunConfig, RunReport};

#[derive(Parser)]
#[command(
    name = "stagehand",
    about = "Lightweight remote configuration orchestrator",
    version,
    disable_colored_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v info logs and task details, -vv debug logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show failures
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    output_format: OutputFormat,
}

#[derive(clap::Args)]
struct ConnectOpts {
    /// Inventory file(s), merged in order
    #[arg(short, long = "inventory", required = true)]
    inventory: Vec<PathBuf>,

    /// Maximum concurrent hosts
    #[arg(short, long, default_value_t = 10)]
    forks: usize,

    /// Connection timeout in seconds, overriding the inventory
    #[arg(short = 'T', long)]
    timeout: Option<u64>,

    /// Directory on the targets to create staging roots in (default: remote home)
    #[arg(long)]
    staging_base: Option<String>,

    /// Module runner for Unix targets (default on Unix: next to this executable)
    #[arg(long)]
    unix_shim: Option<PathBuf>,

    /// Module runner for Windows targets (default on Windows: next to this executable)
    #[arg(long)]
    windows_shim: Option<PathBuf>,

    /// Login user for hosts that do not set one
    #[arg(short, long)]
    user: Option<String>,

    /// SSH private key, overriding the inventory
    #[arg(long)]
    private_key: Option<String>,

    /// Prompt for the SSH password
    #[arg(short = 'k', long)]
    ask_pass: bool,

    /// Prompt for the sudo password
    #[arg(short = 'K', long)]
    ask_sudo_pass: bool,

    /// Use a host's login password for sudo when it has no sudo_password
    #[arg(long)]
    sudo_password_from_login: bool,
}

#[derive(Subcommand)]
#[command(disable_colored_help = true)]
enum Commands {
    /// Run playbooks against a host or group
    Run {
        /// Host or group name
        target: String,

        #[command(flatten)]
        connect: ConnectOpts,

        /// Playbook file(s), run in order
        #[arg(short, long = "playbook", required = true)]
        playbook: Vec<PathBuf>,

        /// Elevate every task
        #[arg(short, long)]
        sudo: bool,
    },

    /// Run a single module ad hoc
    Module {
        /// Host or group name
        target: String,

        #[command(flatten)]
        connect: ConnectOpts,

        /// Module name
        #[arg(short, long)]
        module: String,

        /// Module argument as key=value (repeatable)
        #[arg(short, long = "arg")]
        args: Vec<String>,

        /// Run the module elevated
        #[arg(short, long)]
        sudo: bool,
    },

    /// List hosts, optionally those matching a host or group name
    Inventory {
        /// Inventory file(s), merged in order
        #[arg(short, long = "inventory", required = true)]
        inventory: Vec<PathBuf>,

        pattern: Option<String>,
    },

    /// List built-in modules and their arguments
    Modules,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = Arc::new(Mutex::new(OutputWriter::new(
        cli.output_format,
        cli.verbose > 0,
        cli.quiet,
    )));

    let result = match cli.command {
        Commands::Run {
            target,
            connect,
            playbook,
            sudo,
        } => run_playbooks(&target, connect, &playbook, sudo, output.clone()).await,
        Commands::Module {
            target,
            connect,
            module,
            args,
            sudo,
        } => run_module(&target, connect, &module, &args, sudo, output.clone()).await,
        Commands::Inventory { inventory, pattern } => {
            list_inventory(&inventory, pattern.as_deref())
        }
        Commands::Modules => list_modules(),
    };

    match result {
        Ok(report) => {
            let code = exit_code(report.as_ref());
            if code != 0 {
                std::process::exit(code);
            }
        }
        Err(e) => {
            match e.downcast_ref::<StagehandError>() {
                Some(err) => output.lock().print_error(err),
                None => eprintln!("{}: {:#}", "Error".red().bold(), e),
            }
            std::process::exit(1);
        }
    }
}

/// 0 when every host succeeded (or nothing ran), 2 otherwise
fn exit_code(report: Option<&RunReport>) -> i32 {
    if report.map_or(true, RunReport::success) {
        0
    } else {
        2
    }
}

/// `RUST_LOG` wins; otherwise warn, info with -v, debug with -vv
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn build_executor(
    opts: ConnectOpts,
    sudo: bool,
    catalog: Arc<BuiltinCatalog>,
    output: Arc<Mutex<OutputWriter>>,
) -> anyhow::Result<Executor> {
    let inventory = Inventory::load(opts.inventory.as_slice())?;

    let password = if opts.ask_pass {
        Some(prompt_password("SSH Password: ")?)
    } else {
        None
    };
    let sudo_password = if opts.ask_sudo_pass {
        Some(prompt_password("SUDO Password: ")?)
    } else {
        None
    };

    let mut shims = HashMap::new();
    if let Some(path) = opts.unix_shim {
        shims.insert(PlatformProfile::Unix, path);
    }
    if let Some(path) = opts.windows_shim {
        shims.insert(PlatformProfile::Windows, path);
    }

    let config = RunConfig {
        forks: opts.forks,
        connect_timeout: opts.timeout.map(Duration::from_secs),
        staging_base: opts.staging_base,
        shims,
        sudo_password_from_login: opts.sudo_password_from_login,
        default_user: opts.user,
        password,
        private_key: opts.private_key,
        sudo,
        sudo_password,
    };

    for platform in [PlatformProfile::Unix, PlatformProfile::Windows] {
        let Some(shim) = config.shim_for(platform) else {
            continue;
        };
        if !shim.is_file() {
            anyhow::bail!(
                "{} module runner not found at {} (build it or pass --{}-shim)",
                platform,
                shim.display(),
                platform
            );
        }
    }

    Ok(Executor::new(inventory, catalog, config).with_output(output))
}

async fn run_playbooks(
    target: &str,
    opts: ConnectOpts,
    paths: &[PathBuf],
    sudo: bool,
    output: Arc<Mutex<OutputWriter>>,
) -> anyhow::Result<Option<RunReport>> {
    let catalog = Arc::new(BuiltinCatalog::new()?);
    let playbook = load_playbooks(paths, catalog.as_ref())?;
    let executor = build_executor(opts, sudo, catalog, output)?;
    Ok(Some(executor.run_playbook(target, &playbook).await?))
}

async fn run_module(
    target: &str,
    opts: ConnectOpts,
    module: &str,
    pairs: &[String],
    sudo: bool,
    output: Arc<Mutex<OutputWriter>>,
) -> anyhow::Result<Option<RunReport>> {
    let catalog = Arc::new(BuiltinCatalog::new()?);
    let args = parse_module_args(pairs)?;
    let executor = build_executor(opts, false, catalog, output)?;
    Ok(Some(executor.run_module(target, module, sudo, args).await?))
}

fn list_inventory(paths: &[PathBuf], pattern: Option<&str>) -> anyhow::Result<Option<RunReport>> {
    let inventory = Inventory::load(paths)?;

    let hosts = match pattern {
        Some(name) => inventory.resolve(name)?,
        None => inventory.all_hosts().into_iter().cloned().collect(),
    };

    println!("{} {}", "INVENTORY".green().bold(), inventory);
    for host in &hosts {
        let user = host.username.as_deref().unwrap_or("-");
        println!(
            "  {:<24} {:<18} port={:<5} user={}",
            host.name.white().bold(),
            host.ip,
            host.port,
            user
        );
    }

    if pattern.is_none() {
        println!();
        for group in inventory.group_names() {
            let members = inventory.group_members(group).unwrap_or_default();
            println!("  {} {}", format!("[{}]", group).cyan(), members.join(", "));
        }
    }
    Ok(None)
}

fn list_modules() -> anyhow::Result<Option<RunReport>> {
    for module in registry() {
        println!("{:<10} {}", module.name().white().bold(), module.description());
        for (name, spec) in module.argument_spec().iter() {
            let mut line = format!("    {:<10} {}", name, spec.kind);
            if spec.required {
                line.push_str(" required");
            }
            if let Some(ref default) = spec.default {
                line.push_str(&format!(" default={}", default));
            }
            if !spec.choices.is_empty() {
                line.push_str(&format!(" choices={}", spec.choices.join("|")));
            }
            println!("{}", line.dimmed());
        }
    }
    Ok(None)
}

fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    // Prompt on stderr so it shows even with redirected stdout
    eprint!("{}", prompt.cyan());
    io::stderr().flush().ok();

    let password = rpassword::read_password().context("failed to read password")?;
    let password = password.trim_end_matches(['\r', '\n']).to_string();
    eprintln!();

    if password.is_empty() {
        anyhow::bail!("empty password");
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use stagehand::HostReport;

    fn host(name: &str, error: Option<StagehandError>) -> HostReport {
        HostReport {
            host: name.into(),
            tasks: Vec::new(),
            error,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(None), 0);
        assert_eq!(exit_code(Some(&RunReport::default())), 0);

        let clean = RunReport {
            hosts: vec![host("a", None)],
            duration: Duration::ZERO,
        };
        assert_eq!(exit_code(Some(&clean)), 0);

        let broken = RunReport {
            hosts: vec![
                host("a", None),
                host(
                    "b",
                    Some(StagehandError::Connect {
                        host: "b".into(),
                        message: "refused".into(),
                    }),
                ),
            ],
            duration: Duration::ZERO,
        };
        assert_eq!(exit_code(Some(&broken)), 2);
    }
}
