//! The passphrase source consulted when gpg asks for a secret.

use zeroize::Zeroizing;

/// Hints passed along with a passphrase request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PasswordFlags {
    /// The answer must not be echoed or logged.
    pub secret: bool,
    /// The request unlocks a key rather than a service account.
    pub passphrase: bool,
    /// A previous answer for this key was rejected.
    pub reprompt: bool,
}

/// Supplies and forgets passphrases on behalf of the user.
///
/// Called synchronously from inside the I/O loop, so implementations may block
/// on user interaction.
pub trait Session {
    /// Ask for the passphrase of `key_id`. `None` means the user declined.
    fn get_password(
        &mut self,
        prompt: &str,
        key_id: Option<&str>,
        flags: PasswordFlags,
    ) -> Option<Zeroizing<String>>;

    /// Drop any cached passphrase for `key_id`.
    fn forget_password(&mut self, key_id: Option<&str>);
}

/// A session for operations that never need a secret: every request is declined.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPassphrase;

impl Session for NoPassphrase {
    fn get_password(
        &mut self,
        _prompt: &str,
        key_id: Option<&str>,
        _flags: PasswordFlags,
    ) -> Option<Zeroizing<String>> {
        tracing::debug!(key_id = ?key_id, "Declining unexpected passphrase request");
        None
    }

    fn forget_password(&mut self, _key_id: Option<&str>) {}
}
