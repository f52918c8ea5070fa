//! Public-key encryption through gpg.

use pgp_pipe_core::EncryptedBlob;

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::operation::Operation;
use crate::session::NoPassphrase;

#[derive(Debug, Clone)]
pub struct EncryptOptions {
    /// Also sign as this user.
    pub signer: Option<String>,
    pub recipients: Vec<String>,
    pub armor: bool,
    /// Skip gpg's trust checks on recipient keys.
    pub always_trust: bool,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            signer: None,
            recipients: Vec::new(),
            armor: true,
            always_trust: false,
        }
    }
}

/// Encrypt `data` to every recipient. An empty recipient list is left for
/// gpg to reject.
#[tracing::instrument(skip(config, options, data, cancel), fields(data_len = data.len(), recipients = options.recipients.len()))]
pub fn encrypt(
    config: &EngineConfig,
    options: &EncryptOptions,
    data: &[u8],
    cancel: Option<&CancelToken>,
) -> Result<EncryptedBlob> {
    let operation = Operation::Encrypt {
        signer: options.signer.clone(),
        recipients: options.recipients.clone(),
        armor: options.armor,
        always_trust: options.always_trust,
    };
    let mut engine = Engine::start(config, &operation, Some(Box::new(data)), true, cancel.cloned())?;
    let code = engine.run(&mut NoPassphrase)?;
    if code != Some(0) {
        return Err(engine.failure());
    }

    let ciphertext = engine.take_output();
    tracing::info!(bytes = ciphertext.len(), "Encrypted");
    Ok(EncryptedBlob {
        data: ciphertext.to_vec(),
    })
}
