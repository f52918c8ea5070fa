//! Validity verdicts reported by verify and decrypt.

use serde::{Deserialize, Serialize};

/// Outcome of checking a signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignStatus {
    #[default]
    None,
    Good,
    Bad,
    Unknown,
    NeedPublicKey,
}

impl SignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignStatus::None => "none",
            SignStatus::Good => "good",
            SignStatus::Bad => "bad",
            SignStatus::Unknown => "unknown",
            SignStatus::NeedPublicKey => "need-public-key",
        }
    }
}

/// Whether the content arrived encrypted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptStatus {
    #[default]
    None,
    Encrypted,
}

/// One signer identity as reported by gpg.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Signer {
    /// Decode a comma-separated signer list such as
    /// `"Alice Example" <alice@example.org>, bob <bob@example.org>`.
    ///
    /// Commas inside double quotes or angle brackets do not split entries.
    #[tracing::instrument(level = "trace", skip(text), fields(text_len = text.len()))]
    pub fn parse_list(text: &str) -> Vec<Signer> {
        let mut entries = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;

        for c in text.chars() {
            match c {
                '"' if !in_angle => in_quotes = !in_quotes,
                '<' if !in_quotes => in_angle = true,
                '>' if !in_quotes => in_angle = false,
                ',' if !in_quotes && !in_angle => {
                    entries.push(std::mem::take(&mut current));
                    continue;
                }
                _ => {}
            }
            current.push(c);
        }
        entries.push(current);

        entries
            .iter()
            .filter_map(|entry| Signer::parse_one(entry.trim()))
            .collect()
    }

    fn parse_one(entry: &str) -> Option<Signer> {
        if entry.is_empty() {
            return None;
        }

        if let Some(open) = entry.rfind('<')
            && let Some(close) = entry[open..].find('>')
        {
            let email = entry[open + 1..open + close].trim();
            let name = entry[..open].trim().trim_matches('"').trim();
            return Some(Signer {
                name: (!name.is_empty()).then(|| name.to_string()),
                email: (!email.is_empty()).then(|| email.to_string()),
            });
        }

        let bare = entry.trim_matches('"').trim();
        if bare.contains('@') && !bare.contains(' ') {
            Some(Signer {
                name: None,
                email: Some(bare.to_string()),
            })
        } else {
            Some(Signer {
                name: Some(bare.to_string()),
                email: None,
            })
        }
    }
}

impl std::fmt::Display for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.name, &self.email) {
            (Some(name), Some(email)) => write!(f, "{} <{}>", name, email),
            (Some(name), None) => write!(f, "{}", name),
            (None, Some(email)) => write!(f, "<{}>", email),
            (None, None) => Ok(()),
        }
    }
}

/// Signature half of a validity report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignValidity {
    pub status: SignStatus,
    /// Full gpg diagnostics for the operation.
    pub description: Option<String>,
    pub signers: Vec<Signer>,
}

/// Encryption half of a validity report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptValidity {
    pub status: EncryptStatus,
    pub description: Option<String>,
    /// The message named no recipient key (all-zero key id).
    pub anonymous_recipient: bool,
}

/// Combined verdict returned by verify and decrypt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    pub sign: SignValidity,
    pub encrypt: EncryptValidity,
}
