//! One function per subcommand: read input, run gpg behind a spinner, report.

use anyhow::{Context, Result, anyhow, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use pgp_pipe_core::{HashAlgorithm, KEY_PROTOCOL, SignStatus, Validity, canonicalize};
use pgp_pipe_gpg::{GpgContext, SignOptions, VerifyInput};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use crate::json::{DecryptJson, EncryptJson, KeysJson, SignJson, VerifyJson};
use crate::session::TerminalSession;
use crate::util::{describe, format_bytes, read_input, write_output};

fn spinner(message: String) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message);
    Ok(spinner)
}

fn read_with_spinner(input: Option<&PathBuf>, what: &str) -> Result<Vec<u8>> {
    let spinner = spinner(format!(
        "Reading {} {}",
        what,
        style(describe(input.map(PathBuf::as_path))).cyan()
    ))?;
    let data = read_input(input.map(PathBuf::as_path))?;
    spinner.finish_with_message(format!(
        "[OK] Read {} ({})",
        what,
        style(format_bytes(data.len())).cyan()
    ));
    Ok(data)
}

/// JSON goes to stdout, so the payload itself cannot.
fn ensure_json_has_output(json: bool, output: Option<&PathBuf>) -> Result<()> {
    if json && output.is_none_or(|p| p.as_os_str() == "-") {
        bail!("--json needs --output, stdout is reserved for the JSON report");
    }
    Ok(())
}

fn print_signers(validity: &Validity) {
    for (i, signer) in validity.sign.signers.iter().enumerate() {
        eprintln!("      {}. Signer: {}", i + 1, style(signer).cyan());
    }
}

#[allow(clippy::too_many_arguments)]
pub fn sign(
    ctx: &GpgContext,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    signer: Option<String>,
    hash: &str,
    armor: bool,
    canonical: bool,
    json: bool,
) -> Result<()> {
    ensure_json_has_output(json, output.as_ref())?;
    let hash = HashAlgorithm::from_name(hash)?;
    eprintln!("{}", style("==> Creating detached signature").cyan().bold());

    let mut data = read_with_spinner(input.as_ref(), "input")?;
    if canonical {
        data = canonicalize(&data);
        eprintln!("    Canonicalized to {}", style(format_bytes(data.len())).cyan());
    }
    if let Some(signer) = &signer {
        eprintln!("    Using key: {}", style(signer).cyan());
    }

    let spinner = spinner("Waiting for gpg...".to_string())?;
    let mut session = TerminalSession::new();
    session.attach_spinner(&spinner);
    let options = SignOptions {
        signer,
        hash,
        armor,
    };
    let signature = ctx
        .sign(&options, &data, &mut session)
        .context("Failed to create signature")?;
    spinner.finish_with_message(format!(
        "[OK] Created signature ({}, {})",
        style(format_bytes(signature.data.len())).cyan(),
        signature.micalg()
    ));

    write_output(output.as_ref(), &signature.data)?;

    if json {
        let payload = SignJson {
            status: "ok",
            command: "sign",
            input: describe(input.as_deref()),
            output: describe(output.as_deref()),
            micalg: signature.micalg(),
            content_type: signature.content_type(),
            bytes: signature.data.len(),
        };
        println!("{}", serde_json::to_string(&payload)?);
    }
    Ok(())
}

pub fn verify(
    ctx: &GpgContext,
    input: PathBuf,
    signature: Option<PathBuf>,
    canonical: bool,
    json: bool,
) -> Result<()> {
    eprintln!("{}", style("==> Verifying signature").cyan().bold());

    let mut content = read_with_spinner(Some(&input), "content")?;
    if canonical {
        content = canonicalize(&content);
    }
    let detached = match &signature {
        Some(path) => Some(read_with_spinner(Some(path), "signature")?),
        None => None,
    };

    let spinner = spinner("Waiting for gpg...".to_string())?;
    let request = match &detached {
        Some(signature) => VerifyInput::Detached {
            content: &content,
            signature,
        },
        None => VerifyInput::Inline(&content),
    };
    let validity = ctx.verify(request).context("Failed to verify signature")?;
    spinner.finish_and_clear();

    let status = validity.sign.status;
    if json {
        let payload = VerifyJson {
            status: if status == SignStatus::Good { "ok" } else { "invalid" },
            command: "verify",
            input: input.display().to_string(),
            signature: signature.as_ref().map(|p| p.display().to_string()),
            verdict: status.as_str(),
            signers: validity.sign.signers.clone(),
            description: validity.sign.description.clone(),
        };
        println!("{}", serde_json::to_string(&payload)?);
    }

    if status != SignStatus::Good {
        let description = validity
            .sign
            .description
            .clone()
            .unwrap_or_else(|| "gpg gave no details".to_string());
        return Err(anyhow!(description)).context(format!("Signature is {}", status.as_str()));
    }

    eprintln!(
        "\n{} {}",
        style("[VALID]").green().bold(),
        style("Signature verified").green()
    );
    print_signers(&validity);

    // Only print "OK" when stdout is piped (for pipeline composition)
    if !json && !std::io::stdout().is_terminal() {
        println!("OK");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn encrypt(
    ctx: &GpgContext,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    recipients: Vec<String>,
    signer: Option<String>,
    armor: bool,
    json: bool,
) -> Result<()> {
    ensure_json_has_output(json, output.as_ref())?;
    eprintln!("{}", style("==> Encrypting").cyan().bold());

    let data = read_with_spinner(input.as_ref(), "input")?;
    eprintln!(
        "    Recipients: {}",
        style(recipients.join(", ")).cyan()
    );

    let spinner = spinner("Waiting for gpg...".to_string())?;
    let blob = ctx
        .encrypt(signer.as_deref(), &recipients, armor, &data)
        .context("Failed to encrypt")?;
    spinner.finish_with_message(format!(
        "[OK] Encrypted ({})",
        style(format_bytes(blob.data.len())).cyan()
    ));

    write_output(output.as_ref(), &blob.data)?;

    if json {
        let payload = EncryptJson {
            status: "ok",
            command: "encrypt",
            input: describe(input.as_deref()),
            output: describe(output.as_deref()),
            recipients,
            content_type: blob.content_type(),
            bytes: blob.data.len(),
        };
        println!("{}", serde_json::to_string(&payload)?);
    }
    Ok(())
}

pub fn decrypt(
    ctx: &GpgContext,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    ensure_json_has_output(json, output.as_ref())?;
    eprintln!("{}", style("==> Decrypting").cyan().bold());

    let data = read_with_spinner(input.as_ref(), "ciphertext")?;

    let spinner = spinner("Waiting for gpg...".to_string())?;
    let mut session = TerminalSession::new();
    session.attach_spinner(&spinner);
    let decrypted = ctx
        .decrypt(&data, &mut session)
        .context("Failed to decrypt")?;
    spinner.finish_with_message(format!(
        "[OK] Decrypted ({})",
        style(format_bytes(decrypted.plaintext.len())).cyan()
    ));

    let validity = &decrypted.validity;
    if validity.encrypt.anonymous_recipient {
        eprintln!("    {}", style("Message does not name its recipient").dim());
    }
    match validity.sign.status {
        SignStatus::None => {}
        SignStatus::Good => {
            eprintln!(
                "    {} {}",
                style("[VALID]").green().bold(),
                style("Signed content").green()
            );
            print_signers(validity);
        }
        other => {
            eprintln!(
                "    {} signature is {}",
                style("Warning:").yellow().bold(),
                style(other.as_str()).yellow()
            );
            print_signers(validity);
        }
    }

    write_output(output.as_ref(), &decrypted.plaintext)?;

    if json {
        let payload = DecryptJson {
            status: "ok",
            command: "decrypt",
            input: describe(input.as_deref()),
            output: describe(output.as_deref()),
            bytes: decrypted.plaintext.len(),
            validity,
        };
        println!("{}", serde_json::to_string(&payload)?);
    }
    Ok(())
}

pub fn import(ctx: &GpgContext, input: Option<PathBuf>, json: bool) -> Result<()> {
    eprintln!("{}", style("==> Importing keys").cyan().bold());

    let data = read_with_spinner(input.as_ref(), "keys")?;
    let spinner = spinner("Waiting for gpg...".to_string())?;
    ctx.import_keys(&data).context("Failed to import keys")?;
    spinner.finish_with_message("[OK] Imported keys".to_string());

    if json {
        let payload = KeysJson {
            status: "ok",
            command: "import",
            content_type: KEY_PROTOCOL,
            keys: Vec::new(),
            bytes: data.len(),
        };
        println!("{}", serde_json::to_string(&payload)?);
    }
    Ok(())
}

pub fn export(
    ctx: &GpgContext,
    keys: Vec<String>,
    output: Option<PathBuf>,
    armor: bool,
    json: bool,
) -> Result<()> {
    ensure_json_has_output(json, output.as_ref())?;
    eprintln!("{}", style("==> Exporting keys").cyan().bold());

    let spinner = spinner(format!("Exporting {}", style(keys.join(", ")).cyan()))?;
    let exported = ctx
        .export_keys(&keys, armor)
        .context("Failed to export keys")?;
    spinner.finish_with_message(format!(
        "[OK] Exported {} key(s) ({})",
        keys.len(),
        style(format_bytes(exported.len())).cyan()
    ));

    write_output(output.as_ref(), &exported)?;

    if json {
        let payload = KeysJson {
            status: "ok",
            command: "export",
            content_type: ctx.key_protocol(),
            keys,
            bytes: exported.len(),
        };
        println!("{}", serde_json::to_string(&payload)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_refuses_stdout_payload() {
        assert!(ensure_json_has_output(true, None).is_err());
        assert!(ensure_json_has_output(true, Some(&PathBuf::from("-"))).is_err());
        assert!(ensure_json_has_output(true, Some(&PathBuf::from("sig.asc"))).is_ok());
        assert!(ensure_json_has_output(false, None).is_ok());
    }
}
