//! A configured gpg backend: one place to hold settings shared by every
//! operation.

use pgp_pipe_core::{
    DetachedSignature, ENCRYPT_PROTOCOL, EncryptedBlob, HashAlgorithm, KEY_PROTOCOL,
    SIGN_PROTOCOL, Validity,
};

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::decrypt::{self, Decrypted};
use crate::encrypt::{self, EncryptOptions};
use crate::error::Result;
use crate::keys;
use crate::session::Session;
use crate::sign::{self, SignOptions};
use crate::verify::{self, VerifyInput};

/// Runs OpenPGP operations with a fixed configuration.
///
/// Every call starts its own gpg; nothing is shared between calls except the
/// configuration and the optional cancellation handle.
#[derive(Debug, Clone, Default)]
pub struct GpgContext {
    config: EngineConfig,
    always_trust: bool,
    cancel: Option<CancelToken>,
}

impl GpgContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            always_trust: false,
            cancel: None,
        }
    }

    /// Encrypt to recipient keys regardless of their trust level.
    pub fn with_always_trust(mut self, always_trust: bool) -> Self {
        self.always_trust = always_trust;
        self
    }

    /// Abort running operations when `token` is cancelled.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sign_protocol(&self) -> &'static str {
        SIGN_PROTOCOL
    }

    pub fn encrypt_protocol(&self) -> &'static str {
        ENCRYPT_PROTOCOL
    }

    pub fn key_protocol(&self) -> &'static str {
        KEY_PROTOCOL
    }

    pub fn hash_to_id(&self, hash: HashAlgorithm) -> &'static str {
        hash.to_micalg()
    }

    pub fn id_to_hash(&self, id: &str) -> HashAlgorithm {
        HashAlgorithm::from_micalg(id)
    }

    pub fn sign(
        &self,
        options: &SignOptions,
        data: &[u8],
        session: &mut dyn Session,
    ) -> Result<DetachedSignature> {
        sign::create_signature(&self.config, options, data, session, self.cancel.as_ref())
    }

    pub fn verify(&self, input: VerifyInput<'_>) -> Result<Validity> {
        verify::verify_signature(&self.config, input, self.cancel.as_ref())
    }

    pub fn encrypt(
        &self,
        signer: Option<&str>,
        recipients: &[String],
        armor: bool,
        data: &[u8],
    ) -> Result<EncryptedBlob> {
        let options = EncryptOptions {
            signer: signer.map(str::to_string),
            recipients: recipients.to_vec(),
            armor,
            always_trust: self.always_trust,
        };
        encrypt::encrypt(&self.config, &options, data, self.cancel.as_ref())
    }

    pub fn decrypt(&self, data: &[u8], session: &mut dyn Session) -> Result<Decrypted> {
        decrypt::decrypt(&self.config, data, session, self.cancel.as_ref())
    }

    pub fn import_keys(&self, data: &[u8]) -> Result<()> {
        keys::import_keys(&self.config, data, self.cancel.as_ref())
    }

    pub fn export_keys(&self, keys: &[String], armor: bool) -> Result<Vec<u8>> {
        keys::export_keys(&self.config, keys, armor, self.cancel.as_ref())
    }
}
