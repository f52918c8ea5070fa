//! Shared fixtures: a shell script standing in for gpg.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use pgp_pipe_gpg::{EngineConfig, PasswordFlags, Session};
use tempfile::TempDir;
use zeroize::Zeroizing;

static SERIAL: Mutex<()> = Mutex::new(());

/// Held by every test that writes or runs a script, so no fork ever inherits
/// a script that is still open for writing.
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A gpg replacement: records its argv, then runs `body` with `status`
/// writing to the status fd and fd 8 reading the command fd.
pub struct FakeGpg {
    dir: TempDir,
    path: PathBuf,
}

impl FakeGpg {
    pub fn new(body: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gpg");
        let script = format!(
            r#"#!/bin/bash
WORK='{work}'
printf '%s\n' "$@" > "$WORK/argv"
SFD=
CFD=
for arg in "$@"; do
  case "$arg" in
    --status-fd=*) SFD="${{arg#--status-fd=}}" ;;
    --command-fd=*) CFD="${{arg#--command-fd=}}" ;;
  esac
done
eval "exec 9>&$SFD"
if [ -n "$CFD" ]; then eval "exec 8<&$CFD"; fi
status() {{ printf '[GNUPG:] %s\n' "$*" >&9; }}
{body}
"#,
            work = dir.path().display(),
            body = body,
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, path }
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig::default().with_executable(&self.path)
    }

    /// Scratch directory the script can write into as `$WORK`.
    pub fn work_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Arguments of the last run, program name excluded.
    pub fn argv(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("argv"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Session answering from a fixed list and recording every call.
#[derive(Default)]
pub struct ScriptedSession {
    pub answers: Vec<&'static str>,
    pub prompts: Vec<String>,
    pub forgotten: usize,
}

impl ScriptedSession {
    pub fn answering(answers: &[&'static str]) -> Self {
        Self {
            answers: answers.to_vec(),
            ..Default::default()
        }
    }
}

impl Session for ScriptedSession {
    fn get_password(
        &mut self,
        prompt: &str,
        _key_id: Option<&str>,
        _flags: PasswordFlags,
    ) -> Option<Zeroizing<String>> {
        self.prompts.push(prompt.to_string());
        if self.answers.is_empty() {
            return None;
        }
        Some(Zeroizing::new(self.answers.remove(0).to_string()))
    }

    fn forget_password(&mut self, _key_id: Option<&str>) {
        self.forgotten += 1;
    }
}
