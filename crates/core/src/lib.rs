//! Core pgp-pipe types: hash algorithm registry, validity verdicts, OpenPGP output parts
//! and text canonicalization.
//!
//! This crate provides the shared vocabulary for pgp-pipe, with no process or CLI dependencies.

pub mod canon;
pub mod hash;
pub mod part;
pub mod validity;

pub use canon::canonicalize;
pub use hash::HashAlgorithm;
pub use part::{
    DetachedSignature, ENCRYPT_PROTOCOL, ENCRYPTED_VERSION_BODY, EncryptedBlob, KEY_PROTOCOL,
    SIGN_PROTOCOL,
};
pub use validity::{EncryptStatus, EncryptValidity, SignStatus, SignValidity, Signer, Validity};
