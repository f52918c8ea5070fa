//! Passphrase prompts on the controlling terminal.

use std::collections::HashMap;

use console::{Term, style};
use indicatif::ProgressBar;
use pgp_pipe_gpg::{PasswordFlags, Session};
use zeroize::Zeroizing;

/// Passphrases remembered for the life of the process, keyed by key id.
#[derive(Default)]
pub struct PassphraseCache {
    entries: HashMap<String, Zeroizing<String>>,
}

impl PassphraseCache {
    fn slot(key_id: Option<&str>) -> String {
        key_id.unwrap_or_default().to_string()
    }

    pub fn get(&self, key_id: Option<&str>) -> Option<Zeroizing<String>> {
        self.entries.get(&Self::slot(key_id)).cloned()
    }

    pub fn insert(&mut self, key_id: Option<&str>, passphrase: Zeroizing<String>) {
        self.entries.insert(Self::slot(key_id), passphrase);
    }

    pub fn forget(&mut self, key_id: Option<&str>) -> bool {
        self.entries.remove(&Self::slot(key_id)).is_some()
    }
}

/// Asks on stderr with hidden input, pausing the spinner while it waits.
pub struct TerminalSession {
    term: Term,
    cache: PassphraseCache,
    spinner: Option<ProgressBar>,
}

impl TerminalSession {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
            cache: PassphraseCache::default(),
            spinner: None,
        }
    }

    /// Spinner to hide while a prompt is on screen.
    pub fn attach_spinner(&mut self, spinner: &ProgressBar) {
        self.spinner = Some(spinner.clone());
    }

    fn prompt(&self, prompt: &str, reprompt: bool) -> std::io::Result<String> {
        if reprompt {
            self.term
                .write_line(&format!("{}", style("Bad passphrase, try again.").yellow()))?;
        }
        for line in prompt.lines() {
            self.term.write_line(line)?;
        }
        self.term.write_str(&format!("{} ", style("Passphrase:").bold()))?;
        self.term.read_secure_line()
    }
}

impl Session for TerminalSession {
    fn get_password(
        &mut self,
        prompt: &str,
        key_id: Option<&str>,
        flags: PasswordFlags,
    ) -> Option<Zeroizing<String>> {
        if !flags.reprompt
            && let Some(cached) = self.cache.get(key_id)
        {
            tracing::debug!(key_id = ?key_id, "Using cached passphrase");
            return Some(cached);
        }

        if !self.term.is_term() {
            tracing::warn!("No terminal to ask for a passphrase on");
            return None;
        }

        let answer = match &self.spinner {
            Some(spinner) => spinner.suspend(|| self.prompt(prompt, flags.reprompt)),
            None => self.prompt(prompt, flags.reprompt),
        };

        match answer {
            Ok(line) => {
                let passphrase = Zeroizing::new(line);
                self.cache.insert(key_id, passphrase.clone());
                Some(passphrase)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Passphrase prompt aborted");
                None
            }
        }
    }

    fn forget_password(&mut self, key_id: Option<&str>) {
        if self.cache.forget(key_id) {
            tracing::debug!(key_id = ?key_id, "Forgot cached passphrase");
        }
    }
}
