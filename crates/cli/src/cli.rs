use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pgp-pipe",
    about = "OpenPGP sign, verify, encrypt and decrypt through gpg",
    long_about = "Drive an external gpg over its status-fd protocol. Passphrases are asked for on the terminal and never touch argv or disk."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output machine-readable JSON to stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose logging (sets RUST_LOG=debug if not already set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// gpg executable to run (default: $PGP_PIPE_GPG or gpg on PATH)
    #[arg(long, global = true, value_name = "PROGRAM")]
    pub gpg: Option<PathBuf>,

    /// GnuPG home directory (default: $GNUPGHOME)
    #[arg(long, global = true, value_name = "DIR")]
    pub homedir: Option<PathBuf>,

    /// Never let gpg fetch missing keys from a keyserver
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a detached signature
    Sign {
        /// File to sign (default: stdin)
        input: Option<PathBuf>,

        /// Where to write the signature (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Key to sign with: fingerprint, key ID or email
        #[arg(short = 'u', long = "local-user", value_name = "KEY")]
        signer: Option<String>,

        /// Digest algorithm (sha256, sha512, ...; default: let gpg choose)
        #[arg(long, default_value = "default")]
        hash: String,

        /// Produce an ASCII-armored signature
        #[arg(short, long)]
        armor: bool,

        /// Sign the CRLF, trailing-blank-stripped form of the input
        #[arg(long)]
        canonicalize: bool,
    },

    /// Verify a detached or inline signature
    Verify {
        /// Signed content, or a signed message when --signature is omitted
        input: PathBuf,

        /// Detached signature over INPUT
        #[arg(short, long)]
        signature: Option<PathBuf>,

        /// Verify against the CRLF, trailing-blank-stripped form of the input
        #[arg(long)]
        canonicalize: bool,
    },

    /// Encrypt to one or more recipients
    Encrypt {
        /// File to encrypt (default: stdin)
        input: Option<PathBuf>,

        /// Where to write the ciphertext (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Recipient key (can be provided multiple times)
        #[arg(short, long = "recipient", value_name = "KEY", required = true)]
        recipients: Vec<String>,

        /// Also sign with this key
        #[arg(short = 'u', long = "local-user", value_name = "KEY")]
        signer: Option<String>,

        /// Write binary ciphertext instead of ASCII armor
        #[arg(long)]
        binary: bool,

        /// Use recipient keys regardless of their trust level
        #[arg(long)]
        always_trust: bool,
    },

    /// Decrypt a message and check any signature inside it
    Decrypt {
        /// File to decrypt (default: stdin)
        input: Option<PathBuf>,

        /// Where to write the plaintext (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import keys into the keyring
    Import {
        /// Key file (default: stdin)
        input: Option<PathBuf>,
    },

    /// Export public keys
    Export {
        /// Keys to export: fingerprints, key IDs or emails
        #[arg(required = true)]
        keys: Vec<String>,

        /// Where to write the keys (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Produce ASCII-armored output
        #[arg(short, long)]
        armor: bool,
    },
}
