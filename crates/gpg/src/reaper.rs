//! Collecting gpg's exit status, escalating to signals when it lingers.

use std::process::ExitStatus;
use std::time::{Duration, Instant};

use crate::launcher::{Subprocess, TermSignal};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How far the reaper had to go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Escalation {
    #[default]
    None,
    Terminated,
    Killed,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Reaped {
    pub status: Option<ExitStatus>,
    pub escalation: Escalation,
}

/// Wait up to `timeout` for a normal exit, then escalate.
pub(crate) fn wait(child: &mut dyn Subprocess, timeout: Duration, grace: Duration) -> Reaped {
    if let Some(status) = wait_for(child, timeout) {
        return Reaped {
            status: Some(status),
            escalation: Escalation::None,
        };
    }
    escalate(child, grace)
}

/// Stop `child` now unless it has already exited.
pub(crate) fn cancel(child: &mut dyn Subprocess, grace: Duration) -> Reaped {
    if let Ok(Some(status)) = child.try_wait() {
        return Reaped {
            status: Some(status),
            escalation: Escalation::None,
        };
    }
    escalate(child, grace)
}

fn escalate(child: &mut dyn Subprocess, grace: Duration) -> Reaped {
    for (signal, level) in [
        (TermSignal::Terminate, Escalation::Terminated),
        (TermSignal::Kill, Escalation::Killed),
    ] {
        tracing::warn!(pid = child.id(), signal = ?signal, "gpg did not exit, signalling");
        if let Err(e) = child.signal(signal) {
            tracing::debug!(error = %e, "Signal delivery failed");
        }
        if let Some(status) = wait_for(child, grace) {
            return Reaped {
                status: Some(status),
                escalation: level,
            };
        }
    }
    tracing::warn!(pid = child.id(), "gpg survived SIGKILL");
    Reaped {
        status: None,
        escalation: Escalation::Killed,
    }
}

/// Non-blocking checks until `child` exits or `limit` passes.
fn wait_for(child: &mut dyn Subprocess, limit: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + limit;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(error = %e, "try_wait failed");
                return None;
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Decode a status into gpg's exit code; `None` when it died from a signal.
pub(crate) fn exit_code(status: Option<ExitStatus>) -> Option<i32> {
    status.and_then(|s| s.code())
}
