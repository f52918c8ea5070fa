//! JSON output formats.

use pgp_pipe_core::{Signer, Validity};
use serde::Serialize;

#[derive(Serialize)]
pub struct SignJson<'a> {
    pub status: &'a str,
    pub command: &'a str,
    pub input: String,
    pub output: String,
    pub micalg: &'a str,
    pub content_type: String,
    pub bytes: usize,
}

#[derive(Serialize)]
pub struct VerifyJson<'a> {
    pub status: &'a str,
    pub command: &'a str,
    pub input: String,
    pub signature: Option<String>,
    pub verdict: &'a str,
    pub signers: Vec<Signer>,
    pub description: Option<String>,
}

#[derive(Serialize)]
pub struct EncryptJson<'a> {
    pub status: &'a str,
    pub command: &'a str,
    pub input: String,
    pub output: String,
    pub recipients: Vec<String>,
    pub content_type: String,
    pub bytes: usize,
}

#[derive(Serialize)]
pub struct DecryptJson<'a> {
    pub status: &'a str,
    pub command: &'a str,
    pub input: String,
    pub output: String,
    pub bytes: usize,
    pub validity: &'a Validity,
}

#[derive(Serialize)]
pub struct KeysJson<'a> {
    pub status: &'a str,
    pub command: &'a str,
    pub content_type: &'a str,
    pub keys: Vec<String>,
    pub bytes: usize,
}

#[derive(Serialize)]
pub struct ErrorJson<'a> {
    pub status: &'a str,
    pub error: String,
    pub causes: Vec<String>,
}
