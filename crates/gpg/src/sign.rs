//! Detached signing through gpg.

use pgp_pipe_core::{DetachedSignature, HashAlgorithm};

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::operation::Operation;
use crate::session::Session;

/// Options for detached signing.
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// Key to sign with (`-u`); gpg's default key when unset.
    pub signer: Option<String>,
    pub hash: HashAlgorithm,
    pub armor: bool,
}

/// Create a detached signature over `data`.
///
/// `data` must already be in canonical form; gpg signs the exact bytes.
#[tracing::instrument(skip(config, data, session, cancel), fields(data_len = data.len(), hash = ?options.hash))]
pub fn create_signature(
    config: &EngineConfig,
    options: &SignOptions,
    data: &[u8],
    session: &mut dyn Session,
    cancel: Option<&CancelToken>,
) -> Result<DetachedSignature> {
    let operation = Operation::Sign {
        signer: options.signer.clone(),
        hash: options.hash,
        armor: options.armor,
    };

    tracing::debug!("Starting gpg signer");
    let mut engine = Engine::start(config, &operation, Some(Box::new(data)), true, cancel.cloned())?;
    let code = engine.run(session)?;
    if code != Some(0) {
        return Err(engine.failure());
    }

    // SIG_CREATED names the digest gpg actually used.
    let hash = engine.report().signature_hash.unwrap_or(options.hash);
    let signature = engine.take_output();
    tracing::info!(bytes = signature.len(), hash = ?hash, "Signature created");
    Ok(DetachedSignature {
        hash,
        data: signature.to_vec(),
    })
}
