//! Decryption through gpg, including any signature on the plaintext.

use pgp_pipe_core::{EncryptStatus, EncryptValidity, Validity};
use zeroize::Zeroizing;

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::operation::Operation;
use crate::session::Session;
use crate::status::StatusReport;
use crate::verify::{non_empty, sign_validity};

/// Plaintext and what gpg learned while producing it.
#[derive(Debug)]
pub struct Decrypted {
    /// Wiped when dropped.
    pub plaintext: Zeroizing<Vec<u8>>,
    pub validity: Validity,
}

fn failure_reason(report: &StatusReport) -> Option<String> {
    if report.missing_secret_key {
        Some("Failed to decrypt: no secret key available.".to_string())
    } else if report.decryption_failed {
        Some(match &report.decryption_error {
            Some(error) if !error.is_empty() => format!("Failed to decrypt: {}", error),
            _ => "Failed to decrypt.".to_string(),
        })
    } else {
        None
    }
}

/// Decrypt `data`, asking `session` for the passphrase when gpg needs one.
#[tracing::instrument(skip(config, data, session, cancel), fields(data_len = data.len()))]
pub fn decrypt(
    config: &EngineConfig,
    data: &[u8],
    session: &mut dyn Session,
    cancel: Option<&CancelToken>,
) -> Result<Decrypted> {
    if data.is_empty() {
        return Err(Error::Format(
            "Cannot decrypt message: Incorrect message format".to_string(),
        ));
    }

    let mut engine = Engine::start(
        config,
        &Operation::Decrypt,
        Some(Box::new(data)),
        true,
        cancel.cloned(),
    )?;
    let code = engine.run(session)?;
    if code != Some(0) {
        let diagnostics = engine.diagnostics();
        return Err(match failure_reason(engine.report()) {
            Some(reason) if diagnostics.trim().is_empty() => Error::SubprocessFailure(reason),
            Some(reason) => {
                Error::SubprocessFailure(format!("{}\n\n{}", reason, diagnostics.trim()))
            }
            None => engine.failure(),
        });
    }

    let report = engine.report();
    let mut validity = Validity {
        encrypt: EncryptValidity {
            status: EncryptStatus::Encrypted,
            description: Some("Encrypted content".to_string()),
            anonymous_recipient: report.anonymous_recipient,
        },
        ..Validity::default()
    };
    if report.had_signature {
        validity.sign = sign_validity(report, non_empty(engine.diagnostics()));
    }
    let plaintext = engine.take_output();

    tracing::info!(
        bytes = plaintext.len(),
        signed = validity.sign.status.as_str(),
        "Decrypted"
    );
    Ok(Decrypted {
        plaintext,
        validity,
    })
}
