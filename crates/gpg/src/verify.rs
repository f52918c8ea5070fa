//! Signature verification through gpg.

use std::io::Write;

use pgp_pipe_core::{SignValidity, Signer, Validity};

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::operation::Operation;
use crate::session::NoPassphrase;
use crate::status::StatusReport;

/// What to verify.
#[derive(Debug, Clone, Copy)]
pub enum VerifyInput<'a> {
    /// Data carrying its own signature (cleartext or inline-signed).
    Inline(&'a [u8]),
    /// Canonical content plus a separate signature.
    Detached {
        content: &'a [u8],
        signature: &'a [u8],
    },
}

impl VerifyInput<'_> {
    fn content(&self) -> &[u8] {
        match self {
            VerifyInput::Inline(data) => data,
            VerifyInput::Detached { content, .. } => content,
        }
    }
}

/// Build the signature half of a validity report.
pub(crate) fn sign_validity(report: &StatusReport, description: Option<String>) -> SignValidity {
    SignValidity {
        status: report.sign_status(),
        description,
        signers: report
            .signers
            .as_deref()
            .map(Signer::parse_list)
            .unwrap_or_default(),
    }
}

pub(crate) fn non_empty(text: String) -> Option<String> {
    (!text.trim().is_empty()).then_some(text)
}

/// Check a signature and report who made it and how far they are trusted.
#[tracing::instrument(skip(config, input, cancel), fields(data_len = input.content().len(), detached = matches!(input, VerifyInput::Detached { .. })))]
pub fn verify_signature(
    config: &EngineConfig,
    input: VerifyInput<'_>,
    cancel: Option<&CancelToken>,
) -> Result<Validity> {
    if input.content().is_empty() {
        return Err(Error::Format(
            "Cannot verify message signature: Incorrect message format".to_string(),
        ));
    }

    // Removed from disk when dropped at the end of this call.
    let signature_file = match input {
        VerifyInput::Detached { signature, .. } => {
            if signature.is_empty() {
                return Err(Error::Format(
                    "Cannot verify message signature: Incorrect message format".to_string(),
                ));
            }
            let mut file = tempfile::Builder::new()
                .prefix("pgp-pipe-sig.")
                .tempfile()
                .map_err(|e| {
                    Error::Format(format!(
                        "Cannot verify message signature: could not create temp file: {}",
                        e
                    ))
                })?;
            file.write_all(signature)?;
            file.flush()?;
            Some(file)
        }
        VerifyInput::Inline(_) => None,
    };

    let operation = Operation::Verify {
        signature: signature_file.as_ref().map(|f| f.path().to_path_buf()),
    };
    let mut engine = Engine::start(
        config,
        &operation,
        Some(Box::new(input.content())),
        false,
        cancel.cloned(),
    )?;
    let code = engine.run(&mut NoPassphrase)?;

    let report = engine.report();
    if !report.verify_succeeded(code) {
        return Err(engine.failure());
    }

    let validity = Validity {
        sign: sign_validity(report, non_empty(engine.diagnostics())),
        ..Validity::default()
    };
    tracing::info!(
        status = validity.sign.status.as_str(),
        signers = validity.sign.signers.len(),
        "Signature checked"
    );
    Ok(validity)
}
