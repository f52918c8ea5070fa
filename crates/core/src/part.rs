//! OpenPGP output parts and their MIME labels.

use serde::{Deserialize, Serialize};

use crate::HashAlgorithm;

/// Protocol parameter of `multipart/signed` bodies.
pub const SIGN_PROTOCOL: &str = "application/pgp-signature";
/// Protocol parameter of `multipart/encrypted` bodies.
pub const ENCRYPT_PROTOCOL: &str = "application/pgp-encrypted";
/// Content type of exported key material.
pub const KEY_PROTOCOL: &str = "application/pgp-keys";

/// Control body of the `application/pgp-encrypted` part.
pub const ENCRYPTED_VERSION_BODY: &[u8] = b"Version: 1\n";

/// A detached signature produced by sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedSignature {
    pub hash: HashAlgorithm,
    pub data: Vec<u8>,
}

impl DetachedSignature {
    pub fn content_type(&self) -> String {
        format!("{}; name={}", SIGN_PROTOCOL, self.file_name())
    }

    pub fn file_name(&self) -> &'static str {
        "signature.asc"
    }

    pub fn description(&self) -> &'static str {
        "This is a digitally signed message part"
    }

    /// The `micalg` parameter for the enclosing `multipart/signed`.
    pub fn micalg(&self) -> &'static str {
        self.hash.to_micalg()
    }
}

/// Ciphertext produced by encrypt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub data: Vec<u8>,
}

impl EncryptedBlob {
    pub fn content_type(&self) -> String {
        format!("application/octet-stream; name={}", self.file_name())
    }

    pub fn file_name(&self) -> &'static str {
        "encrypted.asc"
    }

    pub fn description(&self) -> &'static str {
        "This is a digitally encrypted message part"
    }
}
