//! Spawning gpg with its five channels wired up.

use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};

use nix::fcntl::{FcntlArg, FdFlag, OFlag, fcntl};
use nix::sys::signal::{Signal, kill};
use nix::unistd::{Pid, SysconfVar, pipe, setsid, sysconf};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::operation::Operation;

/// Highest descriptor the child scans when marking fds close-on-exec.
const MAX_FD_SCAN: RawFd = 65536;

/// Termination signals the reaper may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    Terminate,
    Kill,
}

/// What the engine needs from a running gpg, independent of how it was started.
pub trait Subprocess: Send {
    fn id(&self) -> u32;

    /// Non-blocking exit check.
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;

    fn signal(&mut self, signal: TermSignal) -> io::Result<()>;
}

/// A gpg started with `std::process`.
#[derive(Debug)]
pub struct UnixChild {
    child: Child,
}

impl Subprocess for UnixChild {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    fn signal(&mut self, signal: TermSignal) -> io::Result<()> {
        let signal = match signal {
            TermSignal::Terminate => Signal::SIGTERM,
            TermSignal::Kill => Signal::SIGKILL,
        };
        let pid = Pid::from_raw(self.child.id() as i32);
        kill(pid, signal).map_err(io::Error::from)
    }
}

/// Parent-side ends of the channels, all non-blocking.
#[derive(Debug)]
pub(crate) struct Channels {
    pub stdin: File,
    pub stdout: File,
    pub stderr: File,
    pub status: File,
    pub command: Option<File>,
}

pub(crate) struct Launched {
    pub child: Box<dyn Subprocess>,
    pub channels: Channels,
}

/// A close-on-exec pipe as `(read, write)`.
pub(crate) fn open_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let (read, write) = pipe().map_err(io::Error::from)?;
    set_cloexec(read.as_raw_fd(), true)?;
    set_cloexec(write.as_raw_fd(), true)?;
    Ok((read, write))
}

pub(crate) fn set_nonblocking(fd: &impl AsFd) -> io::Result<()> {
    let fd = fd.as_fd().as_raw_fd();
    let bits = fcntl(fd, FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let flags = OFlag::from_bits_truncate(bits) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;
    Ok(())
}

fn set_cloexec(fd: RawFd, on: bool) -> io::Result<()> {
    let flags = if on {
        FdFlag::FD_CLOEXEC
    } else {
        FdFlag::empty()
    };
    fcntl(fd, FcntlArg::F_SETFD(flags)).map_err(io::Error::from)?;
    Ok(())
}

struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl Pipe {
    fn open() -> io::Result<Self> {
        let (read, write) = open_pipe()?;
        Ok(Self { read, write })
    }
}

/// Every pipe for one launch. Creation is all-or-nothing: an early failure
/// drops (and closes) whatever was already opened.
struct PipeSet {
    stdin: Pipe,
    stdout: Pipe,
    stderr: Pipe,
    status: Pipe,
    command: Option<Pipe>,
}

impl PipeSet {
    fn open(with_command: bool) -> io::Result<Self> {
        Ok(Self {
            stdin: Pipe::open()?,
            stdout: Pipe::open()?,
            stderr: Pipe::open()?,
            status: Pipe::open()?,
            command: if with_command {
                Some(Pipe::open()?)
            } else {
                None
            },
        })
    }
}

/// Resolve the executable the way a shell would.
fn resolve_program(config: &EngineConfig) -> Result<OsString> {
    which::which(&config.executable)
        .map(OsString::from)
        .map_err(|e| Error::Spawn {
            program: config.program_name(),
            source: io::Error::new(io::ErrorKind::NotFound, e.to_string()),
        })
}

fn open_max() -> RawFd {
    match sysconf(SysconfVar::OPEN_MAX) {
        Ok(Some(limit)) if limit > 0 => RawFd::try_from(limit).unwrap_or(MAX_FD_SCAN).min(MAX_FD_SCAN),
        _ => MAX_FD_SCAN,
    }
}

/// Runs in the forked child before exec: detach from the controlling terminal
/// and let only the status and command descriptors survive exec.
fn prepare_child(status_fd: RawFd, command_fd: Option<RawFd>, max_fd: RawFd) -> io::Result<()> {
    setsid().map_err(io::Error::from)?;
    for fd in 3..max_fd {
        if fd == status_fd || Some(fd) == command_fd {
            set_cloexec(fd, false)?;
        } else {
            let _ = fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC));
        }
    }
    Ok(())
}

/// Start gpg for `operation`.
#[tracing::instrument(skip(config, operation), fields(mode = operation.mode().as_str()))]
pub(crate) fn launch(config: &EngineConfig, operation: &Operation) -> Result<Launched> {
    let program = resolve_program(config)?;
    let spawn_error = |source: io::Error| Error::Spawn {
        program: config.program_name(),
        source,
    };

    let PipeSet {
        stdin,
        stdout,
        stderr,
        status,
        command,
    } = PipeSet::open(operation.needs_passphrase()).map_err(spawn_error)?;

    let status_fd = status.write.as_raw_fd();
    let command_fd = command.as_ref().map(|pipe| pipe.read.as_raw_fd());
    let args = operation.args(status_fd, command_fd, config.online);
    let max_fd = open_max();

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .stdin(Stdio::from(stdin.read))
        .stdout(Stdio::from(stdout.write))
        .stderr(Stdio::from(stderr.write));
    if let Some(home) = &config.home_dir {
        cmd.env("GNUPGHOME", home);
    }
    // SAFETY: the closure only issues setsid and fcntl, both async-signal-safe,
    // and touches no memory shared with the parent.
    unsafe {
        cmd.pre_exec(move || prepare_child(status_fd, command_fd, max_fd));
    }

    tracing::debug!(program = ?program, argc = args.len(), "Spawning gpg");
    let child = cmd.spawn().map_err(spawn_error)?;
    // Closes the child-side stdio ends held by the command.
    drop(cmd);
    drop(status.write);
    let command = command.map(|pipe| {
        drop(pipe.read);
        pipe.write
    });

    let channels = Channels {
        stdin: nonblocking_file(stdin.write)?,
        stdout: nonblocking_file(stdout.read)?,
        stderr: nonblocking_file(stderr.read)?,
        status: nonblocking_file(status.read)?,
        command: command.map(nonblocking_file).transpose()?,
    };
    tracing::debug!(pid = child.id(), "gpg started");

    Ok(Launched {
        child: Box::new(UnixChild { child }),
        channels,
    })
}

fn nonblocking_file(fd: OwnedFd) -> Result<File> {
    set_nonblocking(&fd)?;
    Ok(File::from(fd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn pipes_are_cloexec() {
        let (read, write) = open_pipe().unwrap();
        for fd in [&read, &write] {
            let bits = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFD).unwrap();
            assert!(FdFlag::from_bits_truncate(bits).contains(FdFlag::FD_CLOEXEC));
        }
    }

    #[test]
    fn nonblocking_sets_flag() {
        let (read, _write) = open_pipe().unwrap();
        set_nonblocking(&read).unwrap();
        let bits = fcntl(read.as_raw_fd(), FcntlArg::F_GETFL).unwrap();
        assert!(OFlag::from_bits_truncate(bits).contains(OFlag::O_NONBLOCK));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let config = EngineConfig::default().with_executable("pgp-pipe-no-such-gpg");
        let err = launch(&config, &Operation::Import).err().unwrap();
        assert!(matches!(err, Error::Spawn { .. }));
        assert!(err.to_string().starts_with("Failed to execute pgp-pipe-no-such-gpg"));
    }

    #[test]
    fn unix_child_signals() {
        let _guard = crate::testing::serial();
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let mut child = UnixChild { child };
        assert!(child.try_wait().unwrap().is_none());
        child.signal(TermSignal::Kill).unwrap();
        let status = child.child.wait().unwrap();
        assert_eq!(status.signal(), Some(9));
    }

    #[test]
    fn open_max_is_bounded() {
        let max = open_max();
        assert!(max > 3);
        assert!(max <= MAX_FD_SCAN);
    }
}
