//! Engine configuration.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the gpg executable.
pub const GPG_ENV: &str = "PGP_PIPE_GPG";

/// Settings for one gpg engine. Passed explicitly into every operation.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Program to run; bare names are looked up on `PATH`.
    pub executable: OsString,
    /// Exported to the child as `GNUPGHOME` when set.
    pub home_dir: Option<PathBuf>,
    /// When offline, verify tells gpg not to fetch missing keys.
    pub online: bool,
    /// Upper bound for one poll round.
    pub poll_timeout: Duration,
    /// How long to wait for a normal exit before sending SIGTERM.
    pub wait_timeout: Duration,
    /// Pause after each termination signal before re-checking.
    pub kill_grace: Duration,
    /// Idle sleep while gpg waits on a passphrase outside a data block.
    pub spin_sleep: Duration,
    /// Echo every status line at trace level.
    pub trace_status: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: OsString::from("gpg"),
            home_dir: None,
            online: true,
            poll_timeout: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(1),
            kill_grace: Duration::from_secs(1),
            spin_sleep: Duration::from_millis(10),
            trace_status: false,
        }
    }
}

impl EngineConfig {
    /// Defaults, with `PGP_PIPE_GPG` and `GNUPGHOME` applied when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(exe) = std::env::var_os(GPG_ENV).filter(|v| !v.is_empty()) {
            config.executable = exe;
        }
        if let Some(home) = std::env::var_os("GNUPGHOME").filter(|v| !v.is_empty()) {
            config.home_dir = Some(PathBuf::from(home));
        }
        config
    }

    pub fn with_executable(mut self, executable: impl Into<OsString>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_home_dir(mut self, home_dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home_dir.into());
        self
    }

    pub fn with_online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Name used in user-facing messages.
    pub fn program_name(&self) -> String {
        self.executable.to_string_lossy().into_owned()
    }
}
