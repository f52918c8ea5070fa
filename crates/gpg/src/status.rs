//! gpg's `--status-fd` protocol: line framing and keyword interpretation.

use std::collections::HashMap;

use pgp_pipe_core::{HashAlgorithm, SignStatus};

use crate::error::{Error, RecipientProblem, Result};
use crate::operation::Mode;
use crate::secret::SecretBuffer;
use crate::session::{PasswordFlags, Session};

/// Every status line starts with this.
pub const STATUS_PREFIX: &[u8] = b"[GNUPG:] ";

/// Consecutive rejected passphrases before giving up.
const MAX_BAD_PASSPHRASES: u8 = 3;

/// Accumulates raw status bytes and hands out complete lines.
#[derive(Debug, Default)]
pub(crate) struct StatusBuffer {
    buf: Vec<u8>,
    start: usize,
}

impl StatusBuffer {
    pub(crate) fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next `\n`-terminated line, without the terminator.
    pub(crate) fn next_line(&mut self) -> Option<Vec<u8>> {
        let rest = &self.buf[self.start..];
        let end = rest.iter().position(|b| *b == b'\n')?;
        let line = rest[..end].to_vec();
        self.start += end + 1;
        Some(line)
    }

    /// Shift the unconsumed partial line to the front.
    pub(crate) fn compact(&mut self) {
        self.buf.drain(..self.start);
        self.start = 0;
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> &[u8] {
        &self.buf[self.start..]
    }
}

/// Local trust in the signing key, weakest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Trust {
    #[default]
    None,
    Never,
    Undefined,
    Marginal,
    Fully,
    Ultimate,
}

impl Trust {
    fn from_suffix(suffix: &str) -> Option<Self> {
        if suffix.starts_with("NEVER") {
            Some(Trust::Never)
        } else if suffix.starts_with("MARGINAL") {
            Some(Trust::Marginal)
        } else if suffix.starts_with("FULLY") {
            Some(Trust::Fully)
        } else if suffix.starts_with("ULTIMATE") {
            Some(Trust::Ultimate)
        } else if suffix.starts_with("UNDEFINED") {
            Some(Trust::Undefined)
        } else {
            None
        }
    }
}

/// Everything the status channel told us about signatures and decryption.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub had_signature: bool,
    pub good_signature: bool,
    pub valid_signature: bool,
    pub missing_public_key: bool,
    pub no_data: bool,
    pub trust: Trust,
    /// Comma-joined signer identities in arrival order.
    pub signers: Option<String>,
    pub missing_secret_key: bool,
    pub decryption_failed: bool,
    pub decryption_error: Option<String>,
    pub anonymous_recipient: bool,
    /// Digest gpg reported in `SIG_CREATED`.
    pub signature_hash: Option<HashAlgorithm>,
}

impl StatusReport {
    /// Map the collected flags onto a signature verdict.
    pub fn sign_status(&self) -> SignStatus {
        if self.valid_signature {
            match self.trust {
                Trust::None | Trust::Undefined => SignStatus::Unknown,
                Trust::Never => SignStatus::Bad,
                Trust::Marginal | Trust::Fully | Trust::Ultimate => SignStatus::Good,
            }
        } else if self.missing_public_key {
            SignStatus::NeedPublicKey
        } else {
            SignStatus::Bad
        }
    }

    /// Verify counts as successful when gpg exited cleanly or at least saw a
    /// signature over actual data.
    pub fn verify_succeeded(&self, exit_code: Option<i32>) -> bool {
        exit_code == Some(0) || (self.had_signature && !self.no_data)
    }

    fn append_signer(&mut self, args: &str) {
        // Skip the key id.
        let Some((_, identity)) = args.split_once(' ') else {
            return;
        };
        let formatted = format_identity(identity);
        match &mut self.signers {
            Some(list) => {
                list.push_str(", ");
                list.push_str(&formatted);
            }
            None => self.signers = Some(formatted),
        }
    }
}

/// Quote the display name when it contains spaces:
/// `Alice Q Example <alice@example.org>` → `"Alice Q Example" <alice@example.org>`.
fn format_identity(identity: &str) -> String {
    if let Some(angle) = identity.find('<')
        && let Some(name) = identity[..angle].strip_suffix(' ')
        && name.contains(' ')
    {
        return format!("\"{}\" {}", name, &identity[angle..]);
    }
    identity.to_string()
}

/// gpg's digest algorithm number as carried by `SIG_CREATED`.
fn hash_from_gpg_id(id: &str) -> Option<HashAlgorithm> {
    match id.parse::<u8>().ok()? {
        2 => Some(HashAlgorithm::Sha1),
        3 => Some(HashAlgorithm::Ripemd160),
        8 => Some(HashAlgorithm::Sha256),
        9 => Some(HashAlgorithm::Sha384),
        10 => Some(HashAlgorithm::Sha512),
        _ => None,
    }
}

/// Hint text arrives as UTF-8 from modern gpg; anything else is taken as Latin-1.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|b| char::from(*b)).collect(),
    }
}

fn split_word(text: &[u8]) -> (&[u8], &[u8]) {
    match text.iter().position(|b| *b == b' ') {
        Some(i) => (&text[..i], &text[i + 1..]),
        None => (text, &[]),
    }
}

/// Interprets status lines for one operation.
#[derive(Debug)]
pub(crate) struct StatusParser {
    mode: Mode,
    buffer: StatusBuffer,
    hints: HashMap<String, String>,
    need_id: Option<String>,
    bad_passphrases: u8,
    secret: Option<SecretBuffer>,
    in_data_block: bool,
    report: StatusReport,
    unhandled: Vec<String>,
    trace: bool,
    #[cfg(test)]
    wipe_log: Option<crate::secret::wipe_log::WipeLog>,
}

impl StatusParser {
    pub(crate) fn new(mode: Mode, trace: bool) -> Self {
        Self {
            mode,
            buffer: StatusBuffer::default(),
            hints: HashMap::new(),
            need_id: None,
            bad_passphrases: 0,
            secret: None,
            in_data_block: false,
            report: StatusReport::default(),
            unhandled: Vec::new(),
            trace,
            #[cfg(test)]
            wipe_log: None,
        }
    }

    /// Append raw bytes and interpret every complete line.
    pub(crate) fn feed(&mut self, bytes: &[u8], session: &mut dyn Session) -> Result<()> {
        self.buffer.append(bytes);
        self.parse_pending(session)
    }

    /// Interpret buffered complete lines; stops at the first fatal line.
    pub(crate) fn parse_pending(&mut self, session: &mut dyn Session) -> Result<()> {
        let mut result = Ok(());
        while let Some(line) = self.buffer.next_line() {
            if let Err(e) = self.handle_line(&line, session) {
                result = Err(e);
                break;
            }
        }
        self.buffer.compact();
        result
    }

    pub(crate) fn report(&self) -> &StatusReport {
        &self.report
    }

    pub(crate) fn need_id(&self) -> Option<&str> {
        self.need_id.as_deref()
    }

    pub(crate) fn in_data_block(&self) -> bool {
        self.in_data_block
    }

    pub(crate) fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Hand the staged secret to the sender; it is wiped when dropped.
    pub(crate) fn take_secret(&mut self) -> Option<SecretBuffer> {
        self.secret.take()
    }

    /// Status lines no handler claimed.
    pub(crate) fn unhandled(&self) -> &[String] {
        &self.unhandled
    }

    #[cfg(test)]
    pub(crate) fn set_wipe_log(&mut self, wipe_log: crate::secret::wipe_log::WipeLog) {
        self.wipe_log = Some(wipe_log);
    }

    fn handle_line(&mut self, line: &[u8], session: &mut dyn Session) -> Result<()> {
        let Some(body) = line.strip_prefix(STATUS_PREFIX) else {
            return Err(Error::ProtocolViolation(format!(
                "Unexpected GnuPG status message encountered:\n\n{}",
                String::from_utf8_lossy(line)
            )));
        };
        if self.trace {
            tracing::trace!(target: "pgp_pipe_gpg::status", line = %String::from_utf8_lossy(body));
        }

        let (keyword, raw_args) = split_word(body);
        let keyword = String::from_utf8_lossy(keyword);
        let args = String::from_utf8_lossy(raw_args);

        match keyword.as_ref() {
            "USERID_HINT" => self.user_id_hint(raw_args)?,
            "NEED_PASSPHRASE" | "NEED_PASSPHRASE_PIN" => {
                let (key_id, _) = split_word(raw_args);
                if key_id.is_empty() {
                    return Err(Error::ProtocolViolation(
                        "Failed to parse gpg passphrase request.".to_string(),
                    ));
                }
                let key_id = String::from_utf8_lossy(key_id).into_owned();
                tracing::debug!(key_id = %key_id, "gpg needs a passphrase");
                self.need_id = Some(key_id);
            }
            "GET_HIDDEN" => self.get_hidden(&args, session)?,
            "GOOD_PASSPHRASE" => self.bad_passphrases = 0,
            "BAD_PASSPHRASE" if self.report.anonymous_recipient => {
                // gpg tries every secret key in turn; a miss is not a wrong answer.
                tracing::debug!("Passphrase did not match, trying the next secret key");
            }
            "BAD_PASSPHRASE" => {
                self.bad_passphrases += 1;
                tracing::debug!(count = self.bad_passphrases, "gpg rejected the passphrase");
                if self.bad_passphrases >= MAX_BAD_PASSPHRASES {
                    return Err(Error::AuthenticationFailure);
                }
                session.forget_password(self.need_id.as_deref());
            }
            "UNEXPECTED" => {
                return Err(Error::ProtocolViolation(format!(
                    "Unexpected response from GnuPG: {}",
                    args
                )));
            }
            "NODATA" => self.report.no_data = true,
            "ENC_TO" => {
                let (key_id, _) = split_word(raw_args);
                if !key_id.is_empty() && key_id.iter().all(|b| *b == b'0') {
                    self.report.anonymous_recipient = true;
                }
            }
            keyword => {
                let toggled = if keyword.starts_with("BEGIN_") {
                    self.in_data_block = true;
                    true
                } else if keyword.starts_with("END_") {
                    self.in_data_block = false;
                    true
                } else {
                    false
                };
                if !self.mode_keyword(keyword, &args)? && !toggled {
                    self.unhandled.push(String::from_utf8_lossy(body).into_owned());
                }
            }
        }
        Ok(())
    }

    fn user_id_hint(&mut self, args: &[u8]) -> Result<()> {
        let (key_id, hint) = split_word(args);
        if key_id.is_empty() {
            return Err(Error::ProtocolViolation(
                "Failed to parse gpg userid hint.".to_string(),
            ));
        }
        let key_id = String::from_utf8_lossy(key_id).into_owned();
        if !self.hints.contains_key(&key_id) {
            let hint = decode_text(hint).trim().to_string();
            self.hints.insert(key_id, hint);
        }
        Ok(())
    }

    fn get_hidden(&mut self, args: &str, session: &mut dyn Session) -> Result<()> {
        let name = match self.need_id.as_deref() {
            Some(id) => self.hints.get(id).map(String::as_str).unwrap_or(id),
            None => "",
        };
        let mut prompt = if args.starts_with("passphrase.pin.ask") {
            format!(
                "You need a PIN to unlock the key for your\nSmartCard: \"{}\"",
                name
            )
        } else if args.starts_with("passphrase.enter") {
            format!(
                "You need a passphrase to unlock the key for\nuser: \"{}\"",
                name
            )
        } else {
            return Err(Error::ProtocolViolation(format!(
                "Unexpected request from GnuPG for '{}'",
                args
            )));
        };

        if self.report.anonymous_recipient {
            prompt.push_str(
                "\nThe message does not name its recipient, so you will be asked \
                 for the passphrase of each stored secret key.",
            );
        }

        let flags = PasswordFlags {
            secret: true,
            passphrase: true,
            reprompt: self.bad_passphrases > 0,
        };
        let Some(password) = session.get_password(&prompt, self.need_id.as_deref(), flags) else {
            tracing::debug!("Passphrase request declined");
            return Err(Error::Cancelled);
        };

        #[allow(unused_mut)]
        let mut secret = SecretBuffer::staged(&password);
        #[cfg(test)]
        if let Some(wipe_log) = &self.wipe_log {
            secret.attach_wipe_log(wipe_log.clone());
        }
        tracing::debug!(len = secret.len(), "Passphrase staged");
        self.secret = Some(secret);
        Ok(())
    }

    /// Keywords that only mean something for the current mode. Returns
    /// whether the keyword was recognized.
    fn mode_keyword(&mut self, keyword: &str, args: &str) -> Result<bool> {
        match self.mode {
            Mode::Decrypt => {
                match keyword {
                    "BEGIN_DECRYPTION" => {
                        self.report.decryption_failed = false;
                        return Ok(true);
                    }
                    "NO_SECKEY" => {
                        self.report.missing_secret_key = true;
                        return Ok(true);
                    }
                    "DECRYPTION_FAILED" => {
                        self.report.decryption_failed = true;
                        return Ok(true);
                    }
                    "ERROR" => {
                        self.report.decryption_failed = true;
                        self.report.decryption_error = Some(args.trim().to_string());
                        return Ok(true);
                    }
                    _ => {}
                }
                Ok(self.signature_keyword(keyword, args))
            }
            Mode::Verify => Ok(self.signature_keyword(keyword, args)),
            Mode::Encrypt => match keyword {
                "NO_RECP" => Err(Error::NoRecipients),
                "INV_RECP" => {
                    let (code, recipient) = args.split_once(' ').unwrap_or((args, ""));
                    let code = code.trim().parse::<u32>().unwrap_or(0);
                    Err(Error::InvalidRecipient {
                        recipient: recipient.trim().to_string(),
                        problem: RecipientProblem::from_code(code),
                    })
                }
                _ => Ok(false),
            },
            Mode::Sign => match keyword {
                // SIG_CREATED <type> <pubkey algo> <hash algo> <class> <timestamp> <fpr>
                "SIG_CREATED" => {
                    self.report.signature_hash =
                        args.split_whitespace().nth(2).and_then(hash_from_gpg_id);
                    tracing::debug!(hash = ?self.report.signature_hash, "Signature created");
                    Ok(true)
                }
                _ => Ok(false),
            },
            Mode::Import | Mode::Export => Ok(false),
        }
    }

    fn signature_keyword(&mut self, keyword: &str, args: &str) -> bool {
        if let Some(suffix) = keyword.strip_prefix("TRUST_") {
            if let Some(trust) = Trust::from_suffix(suffix) {
                self.report.trust = trust;
                return true;
            }
            return false;
        }
        match keyword {
            "GOODSIG" => {
                self.report.good_signature = true;
                self.report.had_signature = true;
                self.report.append_signer(args);
            }
            "EXPKEYSIG" => self.report.append_signer(args),
            "VALIDSIG" => self.report.valid_signature = true,
            "BADSIG" => {
                self.report.had_signature = true;
                self.report.append_signer(args);
            }
            "ERRSIG" => self.report.had_signature = true,
            "NO_PUBKEY" => self.report.missing_public_key = true,
            _ => return false,
        }
        true
    }
}
