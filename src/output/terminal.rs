// Rich terminal output for Stagehand

use colored::*;

use super::errors::StagehandError;
use crate::executor::{HostReport, RunReport, TaskReport};
use crate::modules::Outcome;

/// Terminal output manager
pub struct TerminalOutput {
    verbose: bool,
    quiet: bool,
}

impl TerminalOutput {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        let is_tty = atty::is(atty::Stream::Stdout);

        // Respect NO_COLOR (https://no-color.org/) and plain pipes
        if std::env::var("NO_COLOR").is_ok() || !is_tty {
            colored::control::set_override(false);
        }

        TerminalOutput { verbose, quiet }
    }

    /// Print a header for a run
    pub fn print_run_header(&self, target: &str, hosts_count: usize, tasks_count: usize) {
        if self.quiet {
            return;
        }

        println!();
        println!(
            "{} {} ({} hosts, {} tasks)",
            "RUN".green().bold(),
            target.cyan(),
            hosts_count,
            tasks_count
        );
        println!("{}", "─".repeat(60).dimmed());
    }

    /// Print everything one host did, as a unit
    pub fn print_host_report(&self, report: &HostReport) {
        if self.quiet && !report.failed() {
            return;
        }

        println!();
        println!("{} {}", "HOST".yellow().bold(), report.host.white().bold());

        for task in &report.tasks {
            self.print_task_report(task);
        }

        if let Some(ref err) = report.error {
            let label = err.host_status().to_uppercase();
            println!("  {} {} {}", label.red().bold(), "=>".dimmed(), err);
            if let Some(hint) = err.suggestion() {
                println!("      {}: {}", "Hint".yellow().bold(), hint);
            }
        }
    }

    fn print_task_report(&self, task: &TaskReport) {
        if self.quiet && !task.is_failed() {
            return;
        }

        let status = match task.outcome {
            Outcome::Failed => "FAILED".red().bold(),
            Outcome::Changed => "CHANGED".yellow(),
            Outcome::Ok => "OK".green(),
        };

        println!(
            "  {} {} {} {}",
            status,
            "=>".dimmed(),
            task.task,
            format!("[{}]", task.module).dimmed()
        );

        if let Some(msg) = task.msg() {
            if !msg.is_empty() && (self.verbose || task.is_failed() || task.module == "debug") {
                println!("      {}", msg);
            }
        }

        if self.verbose || task.is_failed() {
            for line in task.stderr.lines().filter(|l| !l.trim().is_empty()) {
                println!("      {}", line.red());
            }
        }

        if self.verbose {
            for (key, value) in task.result.iter().filter(|(k, _)| !is_status_key(k)) {
                println!("      {} {}", format!("{}:", key).dimmed(), value);
            }
        }
    }

    /// Print the run recap summary
    pub fn print_recap(&self, report: &RunReport) {
        if self.quiet {
            return;
        }

        println!();
        println!("{}", "RECAP".green().bold());
        println!("{}", "─".repeat(60).dimmed());

        for host in &report.hosts {
            let ok = format!("ok={}", host.ok_count()).green();
            let changed = if host.changed_count() > 0 {
                format!("changed={}", host.changed_count()).yellow()
            } else {
                format!("changed={}", host.changed_count()).normal()
            };
            let failed = if host.failed_count() > 0 {
                format!("failed={}", host.failed_count()).red().bold()
            } else {
                format!("failed={}", host.failed_count()).normal()
            };
            let stopped = match host.error {
                Some(ref err) => format!("{}=1", err.host_status()).red().bold(),
                None => "unreachable=0".normal(),
            };

            println!(
                "{:<30} : {}    {}    {}    {}",
                host.host.white().bold(),
                ok,
                changed,
                failed,
                stopped
            );
        }

        println!();
        println!("Total time: {:.2}s", report.duration.as_secs_f64());
    }

    /// Print a fatal error with its hint
    pub fn print_error(&self, err: &StagehandError) {
        eprintln!("{}: {}", "Error".red().bold(), err);
        if let Some(hint) = err.suggestion() {
            eprintln!("{}: {}", "Hint".yellow().bold(), hint);
        }
    }
}

/// Keys every response carries; shown through the status column instead
fn is_status_key(key: &str) -> bool {
    matches!(key, "changed" | "failed" | "msg")
}

/// Helper for checking if stdout is a TTY
mod atty {
    use std::io::IsTerminal;

    pub enum Stream {
        Stdout,
    }

    pub fn is(stream: Stream) -> bool {
        match stream {
            Stream::Stdout => std::io::stdout().is_terminal(),
        }
    }
}
