//! OpenPGP sign, verify, encrypt, decrypt and key transfer by driving an
//! external gpg over its status-fd protocol.

pub mod cancel;
pub mod config;
pub mod context;
pub mod decrypt;
mod engine;
pub mod encrypt;
pub mod error;
pub mod keys;
mod launcher;
pub mod operation;
mod reaper;
mod secret;
pub mod session;
pub mod sign;
pub mod status;
pub mod verify;

#[cfg(test)]
mod testing;

pub use cancel::CancelToken;
pub use config::{EngineConfig, GPG_ENV};
pub use context::GpgContext;
pub use decrypt::{Decrypted, decrypt};
pub use encrypt::{EncryptOptions, encrypt};
pub use error::{Error, RecipientProblem, Result};
pub use keys::{export_keys, import_keys};
pub use launcher::{Subprocess, TermSignal};
pub use operation::{Mode, Operation};
pub use session::{NoPassphrase, PasswordFlags, Session};
pub use sign::{SignOptions, create_signature};
pub use status::{STATUS_PREFIX, StatusReport, Trust};
pub use verify::{VerifyInput, verify_signature};
