//! The six gpg operations and the argv each one runs with.

use std::ffi::OsString;
use std::os::fd::RawFd;
use std::path::PathBuf;

use pgp_pipe_core::HashAlgorithm;

/// Which status keywords the parser honours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sign,
    Verify,
    Encrypt,
    Decrypt,
    Import,
    Export,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Sign => "sign",
            Mode::Verify => "verify",
            Mode::Encrypt => "encrypt",
            Mode::Decrypt => "decrypt",
            Mode::Import => "import",
            Mode::Export => "export",
        }
    }
}

/// One gpg invocation together with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Sign {
        signer: Option<String>,
        hash: HashAlgorithm,
        armor: bool,
    },
    Verify {
        /// Detached signature file; `None` for inline-signed data on stdin.
        signature: Option<PathBuf>,
    },
    Encrypt {
        signer: Option<String>,
        recipients: Vec<String>,
        armor: bool,
        always_trust: bool,
    },
    Decrypt,
    Import,
    Export {
        keys: Vec<String>,
        armor: bool,
    },
}

impl Operation {
    pub fn mode(&self) -> Mode {
        match self {
            Operation::Sign { .. } => Mode::Sign,
            Operation::Verify { .. } => Mode::Verify,
            Operation::Encrypt { .. } => Mode::Encrypt,
            Operation::Decrypt => Mode::Decrypt,
            Operation::Import => Mode::Import,
            Operation::Export { .. } => Mode::Export,
        }
    }

    /// Sign and decrypt unlock a secret key and get a command channel.
    pub fn needs_passphrase(&self) -> bool {
        matches!(self, Operation::Sign { .. } | Operation::Decrypt)
    }

    /// Arguments after the program name. gpg's behaviour depends on these, so
    /// the order is fixed.
    pub fn args(&self, status_fd: RawFd, command_fd: Option<RawFd>, online: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--verbose".into(),
            "--no-secmem-warning".into(),
            "--no-greeting".into(),
            "--no-tty".into(),
        ];
        if command_fd.is_none() {
            args.push("--batch".into());
            args.push("--yes".into());
        }
        args.push(format!("--status-fd={}", status_fd).into());
        if let Some(fd) = command_fd {
            args.push(format!("--command-fd={}", fd).into());
        }

        match self {
            Operation::Sign {
                signer,
                hash,
                armor,
            } => {
                args.push("--sign".into());
                args.push("--detach".into());
                if *armor {
                    args.push("--armor".into());
                }
                if let Some(flag) = hash.digest_algo_flag() {
                    args.push(flag.into());
                }
                if let Some(uid) = signer {
                    args.push("-u".into());
                    args.push(uid.into());
                }
                args.push("--output".into());
                args.push("-".into());
            }
            Operation::Verify { signature } => {
                if !online {
                    args.push("--keyserver-options".into());
                    args.push("no-auto-key-retrieve".into());
                }
                args.push("--verify".into());
                if let Some(path) = signature {
                    args.push(path.into());
                }
                args.push("-".into());
            }
            Operation::Encrypt {
                signer,
                recipients,
                armor,
                always_trust,
            } => {
                args.push("--encrypt".into());
                if *armor {
                    args.push("--armor".into());
                }
                if *always_trust {
                    args.push("--always-trust".into());
                }
                if let Some(uid) = signer {
                    args.push("-u".into());
                    args.push(uid.into());
                }
                for recipient in recipients {
                    args.push("-r".into());
                    args.push(recipient.into());
                }
                args.push("--output".into());
                args.push("-".into());
            }
            Operation::Decrypt => {
                args.push("--decrypt".into());
                args.push("--output".into());
                args.push("-".into());
            }
            Operation::Import => {
                args.push("--import".into());
                args.push("-".into());
            }
            Operation::Export { keys, armor } => {
                if *armor {
                    args.push("--armor".into());
                }
                args.push("--export".into());
                for key in keys {
                    args.push(key.into());
                }
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.into_string().unwrap())
            .collect()
    }

    #[test]
    fn sign_argv_is_exact() {
        let op = Operation::Sign {
            signer: Some("alice@example.org".into()),
            hash: HashAlgorithm::Sha256,
            armor: true,
        };
        assert_eq!(
            strings(op.args(5, Some(7), true)),
            [
                "--verbose",
                "--no-secmem-warning",
                "--no-greeting",
                "--no-tty",
                "--status-fd=5",
                "--command-fd=7",
                "--sign",
                "--detach",
                "--armor",
                "--digest-algo=SHA256",
                "-u",
                "alice@example.org",
                "--output",
                "-",
            ]
        );
    }

    #[test]
    fn batch_only_without_command_channel() {
        let op = Operation::Import;
        let args = strings(op.args(4, None, true));
        assert_eq!(
            args,
            [
                "--verbose",
                "--no-secmem-warning",
                "--no-greeting",
                "--no-tty",
                "--batch",
                "--yes",
                "--status-fd=4",
                "--import",
                "-",
            ]
        );
    }

    #[test]
    fn offline_verify_disables_key_retrieval() {
        let op = Operation::Verify {
            signature: Some(PathBuf::from("/tmp/sig.asc")),
        };
        let args = strings(op.args(4, None, false));
        let tail = &args[args.len() - 5..];
        assert_eq!(
            tail,
            [
                "--keyserver-options",
                "no-auto-key-retrieve",
                "--verify",
                "/tmp/sig.asc",
                "-"
            ]
        );

        let online = strings(op.args(4, None, true));
        assert!(!online.iter().any(|a| a == "--keyserver-options"));
    }

    #[test]
    fn encrypt_lists_every_recipient() {
        let op = Operation::Encrypt {
            signer: None,
            recipients: vec!["bob".into(), "carol".into()],
            armor: false,
            always_trust: true,
        };
        let args = strings(op.args(4, None, true));
        let start = args.iter().position(|a| a == "--encrypt").unwrap();
        assert_eq!(
            &args[start..],
            ["--encrypt", "--always-trust", "-r", "bob", "-r", "carol", "--output", "-"]
        );
    }

    #[test]
    fn export_puts_armor_first() {
        let op = Operation::Export {
            keys: vec!["ABCD1234".into()],
            armor: true,
        };
        let args = strings(op.args(4, None, true));
        let start = args.iter().position(|a| a == "--armor").unwrap();
        assert_eq!(&args[start..], ["--armor", "--export", "ABCD1234"]);
    }

    #[test]
    fn default_hash_adds_no_digest_flag() {
        let op = Operation::Sign {
            signer: None,
            hash: HashAlgorithm::Default,
            armor: false,
        };
        let args = strings(op.args(4, Some(6), true));
        assert!(!args.iter().any(|a| a.starts_with("--digest-algo")));
        assert!(!args.iter().any(|a| a == "-u"));
    }

    #[test]
    fn passphrase_modes() {
        assert!(Operation::Decrypt.needs_passphrase());
        assert!(!Operation::Import.needs_passphrase());
        assert_eq!(Operation::Decrypt.mode().as_str(), "decrypt");
    }
}
