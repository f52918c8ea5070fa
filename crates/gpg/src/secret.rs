//! Passphrase bytes staged for the command channel.

use zeroize::Zeroize;

/// A newline-terminated passphrase waiting to be written to gpg's command fd.
///
/// The bytes are wiped when the buffer is dropped, whichever path drops it.
pub(crate) struct SecretBuffer {
    bytes: Vec<u8>,
    #[cfg(test)]
    wipe_log: Option<wipe_log::WipeLog>,
}

impl SecretBuffer {
    /// Stage `secret` followed by the `\n` gpg expects on the command fd.
    pub(crate) fn staged(secret: &str) -> Self {
        let mut bytes = Vec::with_capacity(secret.len() + 1);
        bytes.extend_from_slice(secret.as_bytes());
        bytes.push(b'\n');
        Self {
            bytes,
            #[cfg(test)]
            wipe_log: None,
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    #[cfg(test)]
    pub(crate) fn attach_wipe_log(&mut self, wipe_log: wipe_log::WipeLog) {
        self.wipe_log = Some(wipe_log);
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.bytes.as_mut_slice().zeroize();
        #[cfg(test)]
        if let Some(wipe_log) = &self.wipe_log {
            wipe_log.record(&self.bytes);
        }
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBuffer")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}
