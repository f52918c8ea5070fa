//! Hash algorithm registry: micalg identifiers and gpg `--digest-algo` flags.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Hash algorithms a signing request may ask for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    /// Let gpg pick; advertised as SHA-1 in `micalg`.
    #[default]
    Default,
    Md2,
    Md5,
    Sha1,
    Ripemd160,
    Tiger192,
    Haval5160,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// The `micalg` parameter value used on `multipart/signed` parts.
    pub fn to_micalg(&self) -> &'static str {
        match self {
            HashAlgorithm::Md2 => "pgp-md2",
            HashAlgorithm::Md5 => "pgp-md5",
            HashAlgorithm::Sha1 | HashAlgorithm::Default => "pgp-sha1",
            HashAlgorithm::Ripemd160 => "pgp-ripemd160",
            HashAlgorithm::Tiger192 => "pgp-tiger192",
            HashAlgorithm::Haval5160 => "pgp-haval-5-160",
            HashAlgorithm::Sha256 => "pgp-sha256",
            HashAlgorithm::Sha384 => "pgp-sha384",
            HashAlgorithm::Sha512 => "pgp-sha512",
        }
    }

    /// Map a `micalg` value back to an algorithm. Unknown values map to `Default`.
    pub fn from_micalg(id: &str) -> Self {
        match id.to_ascii_lowercase().as_str() {
            "pgp-md2" => HashAlgorithm::Md2,
            "pgp-md5" => HashAlgorithm::Md5,
            "pgp-sha1" => HashAlgorithm::Sha1,
            "pgp-ripemd160" => HashAlgorithm::Ripemd160,
            "pgp-tiger192" | "tiger192" => HashAlgorithm::Tiger192,
            "pgp-haval-5-160" | "haval-5-160" => HashAlgorithm::Haval5160,
            "pgp-sha256" => HashAlgorithm::Sha256,
            "pgp-sha384" => HashAlgorithm::Sha384,
            "pgp-sha512" => HashAlgorithm::Sha512,
            _ => HashAlgorithm::Default,
        }
    }

    /// The gpg flag selecting this digest, if gpg accepts one for it.
    pub fn digest_algo_flag(&self) -> Option<&'static str> {
        match self {
            HashAlgorithm::Md2 => Some("--digest-algo=MD2"),
            HashAlgorithm::Md5 => Some("--digest-algo=MD5"),
            HashAlgorithm::Sha1 => Some("--digest-algo=SHA1"),
            HashAlgorithm::Sha256 => Some("--digest-algo=SHA256"),
            HashAlgorithm::Sha384 => Some("--digest-algo=SHA384"),
            HashAlgorithm::Sha512 => Some("--digest-algo=SHA512"),
            HashAlgorithm::Ripemd160 => Some("--digest-algo=RIPEMD160"),
            HashAlgorithm::Default | HashAlgorithm::Tiger192 | HashAlgorithm::Haval5160 => None,
        }
    }

    /// Parse a short algorithm name as typed on a command line (`sha256`, `SHA-256`, ...).
    pub fn from_name(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(|c| c.to_lowercase())
            .collect();
        match normalized.as_str() {
            "default" => Ok(HashAlgorithm::Default),
            "md2" => Ok(HashAlgorithm::Md2),
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "ripemd160" => Ok(HashAlgorithm::Ripemd160),
            "tiger192" => Ok(HashAlgorithm::Tiger192),
            "haval5160" => Ok(HashAlgorithm::Haval5160),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => bail!("Unsupported hash algorithm: {}", s),
        }
    }
}
