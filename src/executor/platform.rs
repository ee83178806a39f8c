// OS-family specific command construction

use std::fmt;

/// Operating-system family of a connection target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformProfile {
    Unix,
    Windows,
}

impl PlatformProfile {
    /// Family of the machine running the orchestrator
    pub fn controller() -> Self {
        if cfg!(windows) {
            PlatformProfile::Windows
        } else {
            PlatformProfile::Unix
        }
    }

    /// Classify the result of running [`probe_command`](Self::probe_command)
    pub fn from_probe(returncode: i32, stdout: &str) -> Self {
        if returncode == 0 && !stdout.trim().is_empty() {
            PlatformProfile::Unix
        } else {
            PlatformProfile::Windows
        }
    }

    pub fn probe_command(&self) -> &'static str {
        "uname"
    }

    /// Command whose stdout is the connecting user's home directory
    pub fn home_probe(&self) -> &'static str {
        match self {
            PlatformProfile::Unix => "printf %s \"$HOME\"",
            PlatformProfile::Windows => "echo %USERPROFILE%",
        }
    }

    pub fn separator(&self) -> char {
        match self {
            PlatformProfile::Unix => '/',
            PlatformProfile::Windows => '\\',
        }
    }

    /// Join path segments with the target's separator, collapsing duplicate separators
    /// at segment boundaries
    pub fn join<S: AsRef<str>>(&self, segments: &[S]) -> String {
        let sep = self.separator();
        let mut out = String::new();
        for (i, segment) in segments.iter().enumerate() {
            let segment = segment.as_ref();
            if i == 0 {
                out.push_str(segment);
                continue;
            }
            let trimmed = segment.trim_start_matches(['/', '\\']);
            if !out.ends_with(['/', '\\']) {
                out.push(sep);
            }
            out.push_str(trimmed);
        }
        out
    }

    /// Quote a single argument for the target's shell
    pub fn quote(&self, arg: &str) -> String {
        match self {
            PlatformProfile::Unix => format!("'{}'", arg.replace('\'', "'\"'\"'")),
            PlatformProfile::Windows => format!("\"{}\"", arg.replace('"', "\\\"")),
        }
    }

    pub fn remove_dir_all(&self, path: &str) -> String {
        match self {
            PlatformProfile::Unix => format!("rm -rf {}", self.quote(path)),
            PlatformProfile::Windows => format!("rmdir /S /Q {}", self.quote(path)),
        }
    }

    pub fn make_dir(&self, path: &str) -> String {
        match self {
            PlatformProfile::Unix => format!("mkdir -p {}", self.quote(path)),
            PlatformProfile::Windows => format!(
                "if not exist {p} mkdir {p}",
                p = self.quote(path)
            ),
        }
    }

    /// Mark a staged file as runnable by the connecting user only
    pub fn make_executable(&self, path: &str) -> Option<String> {
        match self {
            PlatformProfile::Unix => Some(format!("chmod 700 {}", self.quote(path))),
            PlatformProfile::Windows => None,
        }
    }

    /// Wrap a command so it runs with elevated privileges
    ///
    /// The password prompt is silenced and read from stdin. Windows has no
    /// equivalent, so the command passes through unchanged.
    pub fn elevate(&self, command: &str) -> String {
        match self {
            PlatformProfile::Unix => format!("sudo -S -p '' {}", command),
            PlatformProfile::Windows => {
                tracing::warn!("elevation is not supported on windows targets; running unelevated");
                command.to_string()
            }
        }
    }

    pub fn exe_suffix(&self) -> &'static str {
        match self {
            PlatformProfile::Unix => "",
            PlatformProfile::Windows => ".exe",
        }
    }
}

impl fmt::Display for PlatformProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformProfile::Unix => write!(f, "unix"),
            PlatformProfile::Windows => write!(f, "windows"),
        }
    }
}
