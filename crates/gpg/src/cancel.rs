//! Cross-thread cancellation for running operations.

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::launcher::{open_pipe, set_nonblocking};

/// Cloneable handle that aborts every operation it was handed to.
///
/// Backed by a self-pipe so the step engine sees cancellation as a readable
/// descriptor in the same poll set as gpg's channels.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    reader: File,
    writer: File,
}

impl CancelToken {
    pub fn new() -> io::Result<Self> {
        let (read, write) = open_pipe()?;
        set_nonblocking(&read)?;
        set_nonblocking(&write)?;
        Ok(Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                reader: File::from(read),
                writer: File::from(write),
            }),
        })
    }

    /// Request cancellation. Safe to call from any thread, any number of times.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = (&self.inner.writer).write(&[1]) {
            tracing::warn!(error = %e, "Failed to wake cancellation pipe");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.reader.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

    fn readable(token: &CancelToken) -> bool {
        let mut fds = [PollFd::new(token.as_fd(), PollFlags::POLLIN)];
        poll(&mut fds, PollTimeout::ZERO).unwrap() == 1
    }

    #[test]
    fn fresh_token_is_quiet() {
        let token = CancelToken::new().unwrap();
        assert!(!token.is_cancelled());
        assert!(!readable(&token));
    }

    #[test]
    fn cancel_wakes_every_clone() {
        let token = CancelToken::new().unwrap();
        let other = token.clone();
        std::thread::spawn(move || other.cancel()).join().unwrap();
        assert!(token.is_cancelled());
        assert!(readable(&token));
    }

    #[test]
    fn repeated_cancel_is_harmless() {
        let token = CancelToken::new().unwrap();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
