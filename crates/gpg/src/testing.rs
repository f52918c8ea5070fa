//! Scripted stand-in for gpg used by unit tests.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use tempfile::TempDir;

use crate::config::EngineConfig;

static SERIAL: Mutex<()> = Mutex::new(());

/// Tests that write or spawn executables hold this, so no fork inherits a
/// script still open for writing.
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

const PRELUDE: &str = r#"#!/bin/bash
SFD=
CFD=
for arg in "$@"; do
  case "$arg" in
    --status-fd=*) SFD="${arg#--status-fd=}" ;;
    --command-fd=*) CFD="${arg#--command-fd=}" ;;
  esac
done
eval "exec 9>&$SFD"
if [ -n "$CFD" ]; then eval "exec 8<&$CFD"; fi
status() { printf '[GNUPG:] %s\n' "$*" >&9; }
"#;

/// A shell script that speaks gpg's status protocol.
pub(crate) struct FakeGpg {
    _dir: TempDir,
    path: PathBuf,
}

impl FakeGpg {
    pub(crate) fn new(body: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gpg");
        std::fs::write(&path, format!("{PRELUDE}{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { _dir: dir, path }
    }

    pub(crate) fn config(&self) -> EngineConfig {
        EngineConfig::default().with_executable(&self.path)
    }
}
