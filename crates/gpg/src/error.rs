//! Error taxonomy for gpg-driven operations.

use std::io;

/// Why gpg refused a recipient (`INV_RECP` reason code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientProblem {
    /// Any other reason; carries gpg's code.
    Invalid(u32),
    NotFound,
    Revoked,
    Expired,
    NotTrusted,
    Disabled,
}

impl RecipientProblem {
    pub(crate) fn from_code(code: u32) -> Self {
        match code {
            1 => RecipientProblem::NotFound,
            4 => RecipientProblem::Revoked,
            5 => RecipientProblem::Expired,
            10 => RecipientProblem::NotTrusted,
            13 => RecipientProblem::Disabled,
            other => RecipientProblem::Invalid(other),
        }
    }
}

impl std::fmt::Display for RecipientProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientProblem::Invalid(0) => write!(
                f,
                "is not a valid recipient; gpg may not have its public key imported"
            ),
            RecipientProblem::Invalid(code) => write!(
                f,
                "is not a valid recipient (code {}); gpg may not have its public key imported",
                code
            ),
            RecipientProblem::NotFound => write!(f, "has no public key in the keyring"),
            RecipientProblem::Revoked => write!(f, "has a revoked key"),
            RecipientProblem::Expired => write!(f, "has an expired key"),
            RecipientProblem::NotTrusted => write!(f, "has a key that is not trusted"),
            RecipientProblem::Disabled => write!(f, "has a disabled key"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The gpg process could not be started.
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// gpg said something the status protocol does not allow.
    #[error("{0}")]
    ProtocolViolation(String),

    #[error("Failed to unlock secret key: 3 bad passphrases given.")]
    AuthenticationFailure,

    #[error("Canceled.")]
    Cancelled,

    /// Unexpected read/write/poll failure while talking to gpg.
    #[error("Failed to execute gpg: {0}")]
    Io(#[from] io::Error),

    /// gpg exited unsuccessfully; carries its diagnostics when it left any.
    #[error("{0}")]
    SubprocessFailure(String),

    #[error("Failed to encrypt: No valid recipients specified.")]
    NoRecipients,

    #[error("Failed to encrypt: recipient '{recipient}' {problem}.")]
    InvalidRecipient {
        recipient: String,
        problem: RecipientProblem,
    },

    /// The caller handed over something that is not what the operation needs.
    #[error("{0}")]
    Format(String),
}

impl Error {
    /// Cancellation is a user decision, not a failure to report.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Generic failure: prefer gpg's own diagnostics over the fallback text.
    pub(crate) fn subprocess(diagnostics: Option<&str>) -> Self {
        match diagnostics.map(str::trim) {
            Some(text) if !text.is_empty() => Error::SubprocessFailure(text.to_string()),
            _ => Error::SubprocessFailure("Failed to execute gpg.".to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
