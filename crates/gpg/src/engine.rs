//! Poll-driven exchange with one running gpg.

use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsFd;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use zeroize::Zeroizing;

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::launcher::{self, Launched, Subprocess};
use crate::operation::Operation;
use crate::reaper::{self, Reaped};
use crate::session::Session;
use crate::status::{StatusParser, StatusReport};

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy)]
enum Channel {
    Status,
    Stdout,
    Stderr,
    Command,
    Stdin,
    Cancel,
}

#[derive(Debug, Default)]
struct Ready {
    status: bool,
    stdout: bool,
    stderr: bool,
    command: bool,
    stdin: bool,
    cancel: bool,
}

/// One gpg process and everything flowing in and out of it.
pub(crate) struct Engine<'a> {
    config: EngineConfig,
    child: Box<dyn Subprocess>,
    status: File,
    stdout: File,
    stderr: File,
    stdin: Option<File>,
    command: Option<File>,
    input: Option<Box<dyn Read + 'a>>,
    pending: Vec<u8>,
    output: Zeroizing<Vec<u8>>,
    diagnostics: Vec<u8>,
    parser: StatusParser,
    status_complete: bool,
    stdout_eof: bool,
    stderr_eof: bool,
    reaped: Option<Reaped>,
    cancel: Option<CancelToken>,
}

impl<'a> Engine<'a> {
    /// Launch gpg for `operation`. Without `input` its stdin is closed at
    /// once; without `collect_output` its stdout is never read.
    pub(crate) fn start(
        config: &EngineConfig,
        operation: &Operation,
        input: Option<Box<dyn Read + 'a>>,
        collect_output: bool,
        cancel: Option<CancelToken>,
    ) -> Result<Self> {
        let Launched { child, channels } = launcher::launch(config, operation)?;
        let mut engine = Self {
            config: config.clone(),
            child,
            status: channels.status,
            stdout: channels.stdout,
            stderr: channels.stderr,
            stdin: Some(channels.stdin),
            command: channels.command,
            input,
            pending: Vec::new(),
            output: Zeroizing::new(Vec::new()),
            diagnostics: Vec::new(),
            parser: StatusParser::new(operation.mode(), config.trace_status),
            status_complete: false,
            stdout_eof: !collect_output,
            stderr_eof: false,
            reaped: None,
            cancel,
        };
        if engine.input.is_none() {
            engine.close_stdin("no input");
        }
        Ok(engine)
    }

    /// Stdout, stderr and the status channel have all reached EOF.
    pub(crate) fn is_complete(&self) -> bool {
        self.status_complete && self.stdout_eof && self.stderr_eof
    }

    /// Drive the exchange to completion and reap gpg.
    pub(crate) fn run(&mut self, session: &mut dyn Session) -> Result<Option<i32>> {
        while !self.is_complete() {
            self.step(session)?;
        }
        Ok(self.wait())
    }

    /// One poll round. Any error has already cancelled the process.
    pub(crate) fn step(&mut self, session: &mut dyn Session) -> Result<()> {
        let result = self.step_inner(session);
        if let Err(e) = &result {
            tracing::debug!(error = %e, "Aborting gpg");
            self.abort();
        }
        result
    }

    /// Exit code once gpg is gone; `None` if it died from a signal or
    /// could not be reaped.
    pub(crate) fn wait(&mut self) -> Option<i32> {
        self.stdin = None;
        self.command = None;
        let reaped = match self.reaped {
            Some(reaped) => reaped,
            None => {
                let reaped = reaper::wait(
                    self.child.as_mut(),
                    self.config.wait_timeout,
                    self.config.kill_grace,
                );
                self.reaped = Some(reaped);
                reaped
            }
        };
        let code = reaper::exit_code(reaped.status);
        tracing::debug!(exit_code = ?code, escalation = ?reaped.escalation, "gpg reaped");
        code
    }

    pub(crate) fn report(&self) -> &StatusReport {
        self.parser.report()
    }

    /// Everything gpg wrote to stderr, followed by the status lines no
    /// keyword handler claimed.
    pub(crate) fn diagnostics(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.diagnostics).into_owned();
        for line in self.parser.unhandled() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str("[GNUPG:] ");
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    pub(crate) fn take_output(&mut self) -> Zeroizing<Vec<u8>> {
        std::mem::take(&mut self.output)
    }

    #[cfg(test)]
    pub(crate) fn escalation(&self) -> Option<reaper::Escalation> {
        self.reaped.map(|r| r.escalation)
    }

    /// Generic failure carrying gpg's stderr.
    pub(crate) fn failure(&self) -> Error {
        Error::subprocess(Some(&self.diagnostics()))
    }

    fn step_inner(&mut self, session: &mut dyn Session) -> Result<()> {
        let ready = self.poll_channels()?;

        if ready.cancel && self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            tracing::debug!("Cancellation requested");
            return Err(Error::Cancelled);
        }

        let mut progressed = false;
        if ready.status {
            progressed |= self.read_status(session)?;
        }
        if ready.stdout {
            progressed |= self.read_stdout()?;
        }
        if ready.stderr {
            progressed |= self.read_stderr()?;
        }
        if ready.command {
            progressed |= self.send_secret()?;
        }
        if ready.stdin {
            progressed |= self.feed_stdin()?;
        }

        if !progressed && self.parser.need_id().is_some() && !self.parser.in_data_block() {
            std::thread::sleep(self.config.spin_sleep);
        }
        Ok(())
    }

    fn wants_stdin(&self) -> bool {
        self.stdin.is_some() && (!self.pending.is_empty() || self.input.is_some())
    }

    fn poll_channels(&self) -> Result<Ready> {
        let read = PollFlags::POLLIN;
        let write = PollFlags::POLLOUT;
        let mut fds = Vec::with_capacity(6);
        let mut channels = Vec::with_capacity(6);

        if !self.status_complete {
            fds.push(PollFd::new(self.status.as_fd(), read));
            channels.push(Channel::Status);
        }
        if !self.stdout_eof {
            fds.push(PollFd::new(self.stdout.as_fd(), read));
            channels.push(Channel::Stdout);
        }
        if !self.stderr_eof {
            fds.push(PollFd::new(self.stderr.as_fd(), read));
            channels.push(Channel::Stderr);
        }
        if self.parser.has_secret()
            && let Some(command) = &self.command
        {
            fds.push(PollFd::new(command.as_fd(), write));
            channels.push(Channel::Command);
        }
        if self.wants_stdin()
            && let Some(stdin) = &self.stdin
        {
            fds.push(PollFd::new(stdin.as_fd(), write));
            channels.push(Channel::Stdin);
        }
        if let Some(token) = &self.cancel {
            fds.push(PollFd::new(token.as_fd(), read));
            channels.push(Channel::Cancel);
        }

        let millis = u16::try_from(self.config.poll_timeout.as_millis()).unwrap_or(u16::MAX);
        loop {
            match poll(&mut fds, PollTimeout::from(millis)) {
                Ok(0) => return Ok(Ready::default()),
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(Error::Io(io::Error::from(e))),
            }
        }

        let mut ready = Ready::default();
        for (fd, channel) in fds.iter().zip(channels) {
            if fd.revents().is_none_or(|events| events.is_empty()) {
                continue;
            }
            match channel {
                Channel::Status => ready.status = true,
                Channel::Stdout => ready.stdout = true,
                Channel::Stderr => ready.stderr = true,
                Channel::Command => ready.command = true,
                Channel::Stdin => ready.stdin = true,
                Channel::Cancel => ready.cancel = true,
            }
        }
        Ok(ready)
    }

    fn read_status(&mut self, session: &mut dyn Session) -> Result<bool> {
        let mut buf = [0u8; READ_CHUNK];
        match read_chunk(&mut self.status, &mut buf)? {
            None => Ok(false),
            Some(0) => {
                tracing::debug!("Status channel closed");
                self.status_complete = true;
                Ok(true)
            }
            Some(n) => {
                self.parser.feed(&buf[..n], session)?;
                Ok(true)
            }
        }
    }

    fn read_stdout(&mut self) -> Result<bool> {
        let mut buf = [0u8; READ_CHUNK];
        match read_chunk(&mut self.stdout, &mut buf)? {
            None => Ok(false),
            Some(0) => {
                tracing::debug!(bytes = self.output.len(), "gpg stdout closed");
                self.stdout_eof = true;
                Ok(true)
            }
            Some(n) => {
                self.output.extend_from_slice(&buf[..n]);
                Ok(true)
            }
        }
    }

    fn read_stderr(&mut self) -> Result<bool> {
        let mut buf = [0u8; READ_CHUNK];
        match read_chunk(&mut self.stderr, &mut buf)? {
            None => Ok(false),
            Some(0) => {
                self.stderr_eof = true;
                Ok(true)
            }
            Some(n) => {
                self.diagnostics.extend_from_slice(&buf[..n]);
                Ok(true)
            }
        }
    }

    /// Write the staged passphrase. The buffer is wiped on return whether or
    /// not the write succeeded.
    fn send_secret(&mut self) -> Result<bool> {
        let Some(command) = self.command.as_mut() else {
            return Ok(false);
        };
        let Some(secret) = self.parser.take_secret() else {
            return Ok(false);
        };
        write_fully(command, secret.as_bytes())?;
        tracing::debug!("Passphrase sent");
        Ok(true)
    }

    fn feed_stdin(&mut self) -> Result<bool> {
        if self.pending.is_empty() {
            let Some(source) = self.input.as_mut() else {
                self.close_stdin("input drained");
                return Ok(false);
            };
            let mut chunk = [0u8; READ_CHUNK];
            let n = loop {
                match source.read(&mut chunk) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            };
            if n == 0 {
                self.input = None;
                self.close_stdin("input exhausted");
                return Ok(true);
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Ok(false);
        };
        let mut wrote = false;
        let mut broken = false;
        while !self.pending.is_empty() {
            match stdin.write(&self.pending) {
                Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero).into()),
                Ok(n) => {
                    self.pending.drain(..n);
                    wrote = true;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    broken = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        if broken {
            self.pending.clear();
            self.input = None;
            self.close_stdin("gpg stopped reading");
            return Ok(true);
        }
        Ok(wrote)
    }

    fn close_stdin(&mut self, reason: &str) {
        if self.stdin.take().is_some() {
            tracing::debug!(reason, "Closed gpg stdin");
        }
    }

    fn abort(&mut self) {
        drop(self.parser.take_secret());
        self.stdin = None;
        self.command = None;
        if self.reaped.is_none() {
            self.reaped = Some(reaper::cancel(self.child.as_mut(), self.config.kill_grace));
        }
    }
}

impl Drop for Engine<'_> {
    fn drop(&mut self) {
        if self.reaped.is_none() {
            self.abort();
        }
    }
}

/// One bounded read; `Ok(None)` when the descriptor had nothing after all.
fn read_chunk(file: &mut File, buf: &mut [u8]) -> io::Result<Option<usize>> {
    loop {
        match file.read(buf) {
            Ok(n) => return Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e),
        }
    }
}

/// Write all of `bytes` to a non-blocking descriptor.
fn write_fully(file: &mut File, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        match file.write(bytes) {
            Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLOUT)];
                match poll(&mut fds, PollTimeout::from(100u16)) {
                    Ok(_) | Err(Errno::EINTR) => {}
                    Err(e) => return Err(io::Error::from(e)),
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
