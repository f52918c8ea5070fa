//! Keyring import and export.

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::operation::Operation;
use crate::session::NoPassphrase;

/// Feed key material into the keyring.
#[tracing::instrument(skip(config, data, cancel), fields(data_len = data.len()))]
pub fn import_keys(config: &EngineConfig, data: &[u8], cancel: Option<&CancelToken>) -> Result<()> {
    let mut engine = Engine::start(
        config,
        &Operation::Import,
        Some(Box::new(data)),
        false,
        cancel.cloned(),
    )?;
    let code = engine.run(&mut NoPassphrase)?;
    if code != Some(0) {
        return Err(engine.failure());
    }
    tracing::info!("Keys imported");
    Ok(())
}

/// Export public keys; an empty `keys` exports the whole keyring.
#[tracing::instrument(skip(config, keys, cancel), fields(keys = keys.len()))]
pub fn export_keys(
    config: &EngineConfig,
    keys: &[String],
    armor: bool,
    cancel: Option<&CancelToken>,
) -> Result<Vec<u8>> {
    let operation = Operation::Export {
        keys: keys.to_vec(),
        armor,
    };
    let mut engine = Engine::start(config, &operation, None, true, cancel.cloned())?;
    let code = engine.run(&mut NoPassphrase)?;
    if code != Some(0) {
        return Err(engine.failure());
    }
    let exported = engine.take_output().to_vec();
    tracing::info!(bytes = exported.len(), "Keys exported");
    Ok(exported)
}
