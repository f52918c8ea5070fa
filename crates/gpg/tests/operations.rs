mod support;

use std::time::{Duration, Instant};

use nix::sys::signal::kill;
use nix::unistd::Pid;
use pgp_pipe_core::{EncryptStatus, HashAlgorithm, SignStatus};
use pgp_pipe_gpg::{
    CancelToken, EncryptOptions, Error, GpgContext, NoPassphrase, RecipientProblem, SignOptions,
    VerifyInput, create_signature, decrypt, encrypt, export_keys, import_keys, verify_signature,
};
use support::{FakeGpg, ScriptedSession, serial};

const MESSAGE: &[u8] = b"Content-Type: text/plain\r\n\r\nhello\r\n";

#[test]
fn verify_detached_good_signature() {
    let _guard = serial();
    let gpg = FakeGpg::new(
        r#"
for a; do sig=$prev; prev=$a; done
cp "$sig" "$WORK/sig-copy"
cat > "$WORK/content"
echo "gpg: Signature made Mon Jan  1 00:00:00 2024 UTC" >&2
status "NEWSIG"
status "GOODSIG 0123456789ABCDEF Alice Example <alice@example.org>"
status "VALIDSIG 0123456789ABCDEF0123456789ABCDEF01234567 2024-01-01 1704067200"
status "TRUST_ULTIMATE 0 pgp"
"#,
    );

    let validity = verify_signature(
        &gpg.config(),
        VerifyInput::Detached {
            content: MESSAGE,
            signature: b"-----BEGIN PGP SIGNATURE-----",
        },
        None,
    )
    .unwrap();

    assert_eq!(validity.sign.status, SignStatus::Good);
    assert_eq!(validity.sign.signers.len(), 1);
    assert_eq!(
        validity.sign.signers[0].to_string(),
        "Alice Example <alice@example.org>"
    );
    assert!(
        validity
            .sign
            .description
            .as_deref()
            .unwrap()
            .contains("Signature made")
    );

    let work = gpg.work_dir();
    assert_eq!(std::fs::read(work.join("content")).unwrap(), MESSAGE);
    assert_eq!(
        std::fs::read(work.join("sig-copy")).unwrap(),
        b"-----BEGIN PGP SIGNATURE-----"
    );

    let argv = gpg.argv();
    let sig_path = &argv[argv.len() - 2];
    assert!(sig_path.contains("pgp-pipe-sig."));
    assert!(!std::path::Path::new(sig_path).exists(), "temp signature file removed");
    assert_eq!(argv[argv.len() - 3], "--verify");
}

#[test]
fn verify_nonzero_exit_with_signature_still_reports() {
    let _guard = serial();
    let gpg = FakeGpg::new(
        r#"
cat >/dev/null
status "ERRSIG 0123456789ABCDEF 1 8 00 1704067200 9"
status "NO_PUBKEY 0123456789ABCDEF"
echo "gpg: Can't check signature: No public key" >&2
exit 2
"#,
    );
    let validity = verify_signature(&gpg.config(), VerifyInput::Inline(MESSAGE), None).unwrap();
    assert_eq!(validity.sign.status, SignStatus::NeedPublicKey);
    assert!(validity.sign.signers.is_empty());
}

#[test]
fn verify_without_data_fails_with_diagnostics() {
    let _guard = serial();
    let gpg = FakeGpg::new(
        r#"
cat >/dev/null
status "NODATA 1"
echo "gpg: no valid OpenPGP data found." >&2
exit 2
"#,
    );
    let err = verify_signature(&gpg.config(), VerifyInput::Inline(MESSAGE), None).unwrap_err();
    assert_eq!(err.to_string(), "gpg: no valid OpenPGP data found.");
}

#[test]
fn verify_rejects_empty_content_before_spawning() {
    let config = pgp_pipe_gpg::EngineConfig::default().with_executable("pgp-pipe-no-such-gpg");
    let err = verify_signature(&config, VerifyInput::Inline(b""), None).unwrap_err();
    assert!(matches!(err, Error::Format(_)));
}

#[test]
fn offline_verify_disables_key_retrieval() {
    let _guard = serial();
    let gpg = FakeGpg::new("cat >/dev/null\nstatus \"VALIDSIG X\"\n");
    let config = gpg.config().with_online(false);
    let validity = verify_signature(&config, VerifyInput::Inline(MESSAGE), None).unwrap();
    assert_eq!(validity.sign.status, SignStatus::Unknown);
    let argv = gpg.argv();
    assert!(
        argv.windows(2)
            .any(|w| w[0] == "--keyserver-options" && w[1] == "no-auto-key-retrieve")
    );
    assert!(argv.contains(&"--batch".to_string()));
}

#[test]
fn encrypt_without_recipients_fails_on_no_recp() {
    let _guard = serial();
    let gpg = FakeGpg::new(
        r#"
cat >/dev/null
status "NO_RECP 0"
echo "gpg: no valid addressees" >&2
exit 0
"#,
    );
    let err = encrypt(&gpg.config(), &EncryptOptions::default(), MESSAGE, None).unwrap_err();
    assert!(matches!(err, Error::NoRecipients));
}

#[test]
fn encrypt_reports_invalid_recipient() {
    let _guard = serial();
    let gpg = FakeGpg::new(
        r#"
cat >/dev/null
status "INV_RECP 5 bob@example.org"
exit 2
"#,
    );
    let options = EncryptOptions {
        recipients: vec!["bob@example.org".into()],
        ..EncryptOptions::default()
    };
    match encrypt(&gpg.config(), &options, MESSAGE, None).unwrap_err() {
        Error::InvalidRecipient { recipient, problem } => {
            assert_eq!(recipient, "bob@example.org");
            assert_eq!(problem, RecipientProblem::Expired);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn encrypt_returns_ciphertext_and_passes_recipients() {
    let _guard = serial();
    let gpg = FakeGpg::new(
        r#"
cat >/dev/null
status "BEGIN_ENCRYPTION 2 9"
printf '%s' '-----BEGIN PGP MESSAGE-----'
status "END_ENCRYPTION"
"#,
    );
    let ctx = GpgContext::new(gpg.config()).with_always_trust(true);
    let blob = ctx
        .encrypt(
            Some("alice@example.org"),
            &["bob@example.org".into(), "carol@example.org".into()],
            true,
            MESSAGE,
        )
        .unwrap();
    assert_eq!(blob.data, b"-----BEGIN PGP MESSAGE-----");

    let argv = gpg.argv();
    let start = argv.iter().position(|a| a == "--encrypt").unwrap();
    assert_eq!(
        &argv[start..],
        [
            "--encrypt",
            "--armor",
            "--always-trust",
            "-u",
            "alice@example.org",
            "-r",
            "bob@example.org",
            "-r",
            "carol@example.org",
            "--output",
            "-"
        ]
    );
}

const SIGNER_SCRIPT: &str = r#"
status "USERID_HINT 0123456789ABCDEF Alice Example <alice@example.org>"
status "NEED_PASSPHRASE 0123456789ABCDEF 0123456789ABCDEF 1 0"
while :; do
  status "GET_HIDDEN passphrase.enter"
  read -r pass <&8 || exit 2
  if [ "$pass" = "hunter2" ]; then break; fi
  status "BAD_PASSPHRASE 0123456789ABCDEF"
done
status "GOOD_PASSPHRASE"
cat > "$WORK/signed"
status "BEGIN_SIGNING H8"
printf '%s' 'SIGNATURE'
status "SIG_CREATED D 1 8 00 1704067200 0123456789ABCDEF0123456789ABCDEF01234567"
"#;

#[test]
fn sign_relays_passphrase() {
    let _guard = serial();
    let gpg = FakeGpg::new(SIGNER_SCRIPT);
    let mut session = ScriptedSession::answering(&["wrong", "hunter2"]);
    let options = SignOptions {
        signer: Some("alice@example.org".into()),
        hash: HashAlgorithm::Sha256,
        armor: true,
    };
    let signature = create_signature(&gpg.config(), &options, MESSAGE, &mut session, None).unwrap();

    assert_eq!(signature.data, b"SIGNATURE");
    assert_eq!(signature.micalg(), "pgp-sha256");
    assert_eq!(std::fs::read(gpg.work_dir().join("signed")).unwrap(), MESSAGE);
    assert_eq!(session.prompts.len(), 2);
    assert_eq!(
        session.prompts[0],
        "You need a passphrase to unlock the key for\nuser: \"Alice Example <alice@example.org>\""
    );
    assert_eq!(session.forgotten, 1);

    let argv = gpg.argv();
    assert!(argv.iter().any(|a| a.starts_with("--command-fd=")));
    assert!(!argv.contains(&"--batch".to_string()));
    assert!(argv.contains(&"--digest-algo=SHA256".to_string()));
}

#[test]
fn sign_with_default_digest_reports_what_gpg_used() {
    let _guard = serial();
    let gpg = FakeGpg::new(SIGNER_SCRIPT);
    let mut session = ScriptedSession::answering(&["hunter2"]);
    let signature = create_signature(
        &gpg.config(),
        &SignOptions::default(),
        MESSAGE,
        &mut session,
        None,
    )
    .unwrap();

    assert_eq!(signature.hash, HashAlgorithm::Sha256);
    assert_eq!(signature.micalg(), "pgp-sha256");
    assert!(!gpg.argv().iter().any(|a| a.starts_with("--digest-algo")));
}

#[test]
fn sign_gives_up_after_three_bad_passphrases() {
    let _guard = serial();
    let gpg = FakeGpg::new(SIGNER_SCRIPT);
    let mut session = ScriptedSession::answering(&["a", "b", "c", "d"]);
    let err = create_signature(
        &gpg.config(),
        &SignOptions::default(),
        MESSAGE,
        &mut session,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailure));
    assert_eq!(session.prompts.len(), 3);
    assert_eq!(session.forgotten, 2);
}

#[test]
fn sign_declined_passphrase_is_cancellation() {
    let _guard = serial();
    let gpg = FakeGpg::new(SIGNER_SCRIPT);
    let mut session = ScriptedSession::default();
    let err = create_signature(
        &gpg.config(),
        &SignOptions::default(),
        MESSAGE,
        &mut session,
        None,
    )
    .unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn decrypt_reports_signature_and_anonymous_recipient() {
    let _guard = serial();
    let gpg = FakeGpg::new(
        r#"
status "ENC_TO 0000000000000000 1 0"
status "NEED_PASSPHRASE 0000000000000000 0000000000000000 1 0"
status "GET_HIDDEN passphrase.enter"
read -r pass <&8
status "GOOD_PASSPHRASE"
cat >/dev/null
status "BEGIN_DECRYPTION"
status "GOODSIG 0123456789ABCDEF Alice Example <alice@example.org>"
status "VALIDSIG 0123456789ABCDEF0123456789ABCDEF01234567"
status "TRUST_UNDEFINED"
printf '%s' 'plaintext'
status "DECRYPTION_OKAY"
status "END_DECRYPTION"
"#,
    );
    let mut session = ScriptedSession::answering(&["secret"]);
    let decrypted = decrypt(&gpg.config(), b"ciphertext", &mut session, None).unwrap();
    assert_eq!(decrypted.plaintext.as_slice(), b"plaintext");
    assert_eq!(decrypted.validity.encrypt.status, EncryptStatus::Encrypted);
    assert!(decrypted.validity.encrypt.anonymous_recipient);
    assert_eq!(decrypted.validity.sign.status, SignStatus::Unknown);
    assert_eq!(
        decrypted.validity.sign.signers[0].email.as_deref(),
        Some("alice@example.org")
    );
}

#[test]
fn decrypt_without_signature_leaves_sign_status_none() {
    let _guard = serial();
    let gpg = FakeGpg::new("cat >/dev/null\nprintf '%s' 'plain'\n");
    let decrypted = decrypt(&gpg.config(), b"ciphertext", &mut NoPassphrase, None).unwrap();
    assert_eq!(decrypted.validity.sign.status, SignStatus::None);
    assert!(!decrypted.validity.encrypt.anonymous_recipient);
}

#[test]
fn decrypt_failure_names_missing_key() {
    let _guard = serial();
    let gpg = FakeGpg::new(
        r#"
cat >/dev/null
status "ENC_TO 0123456789ABCDEF 1 0"
status "NO_SECKEY 0123456789ABCDEF"
status "BEGIN_DECRYPTION"
status "DECRYPTION_FAILED"
status "END_DECRYPTION"
exit 2
"#,
    );
    let err = decrypt(&gpg.config(), b"ciphertext", &mut NoPassphrase, None).unwrap_err();
    assert_eq!(err.to_string(), "Failed to decrypt: no secret key available.");
}

#[test]
fn import_and_export_shuttle_bytes() {
    let _guard = serial();
    let gpg = FakeGpg::new(
        r#"
case " $* " in
  *" --import "*) cat > "$WORK/imported" ;;
  *" --export "*) cat "$WORK/imported" ;;
esac
"#,
    );
    let key = b"-----BEGIN PGP PUBLIC KEY BLOCK-----\n";
    import_keys(&gpg.config(), key, None).unwrap();
    assert_eq!(gpg.argv().last().unwrap(), "-");

    let exported = export_keys(&gpg.config(), &["ABCD1234".into()], true, None).unwrap();
    assert_eq!(exported, key);
    let argv = gpg.argv();
    assert_eq!(&argv[argv.len() - 3..], ["--armor", "--export", "ABCD1234"]);
}

#[test]
fn failed_import_prefers_gpg_diagnostics() {
    let _guard = serial();
    let gpg = FakeGpg::new("cat >/dev/null\necho 'gpg: no valid OpenPGP data found.' >&2\nexit 2\n");
    let err = import_keys(&gpg.config(), b"junk", None).unwrap_err();
    assert_eq!(err.to_string(), "gpg: no valid OpenPGP data found.");

    let silent = FakeGpg::new("cat >/dev/null\nexit 2\n");
    let err = import_keys(&silent.config(), b"junk", None).unwrap_err();
    assert_eq!(err.to_string(), "Failed to execute gpg.");
}

#[test]
fn failure_text_includes_unclaimed_status_lines() {
    let _guard = serial();
    let gpg = FakeGpg::new(
        r#"
cat >/dev/null
echo 'gpg: key 0123456789ABCDEF: no valid user IDs' >&2
status "IMPORT_PROBLEM 1 0123456789ABCDEF0123456789ABCDEF01234567"
exit 2
"#,
    );
    let err = import_keys(&gpg.config(), b"key", None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "gpg: key 0123456789ABCDEF: no valid user IDs\n\
         [GNUPG:] IMPORT_PROBLEM 1 0123456789ABCDEF0123456789ABCDEF01234567"
    );
}

#[test]
fn protocol_violation_surfaces_offending_line() {
    let _guard = serial();
    let gpg = FakeGpg::new("cat >/dev/null\nprintf 'garbage\\n' >&9\n");
    let err = import_keys(&gpg.config(), b"key", None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unexpected GnuPG status message encountered:\n\ngarbage"
    );
}

#[test]
fn cancellation_escalates_past_ignored_sigterm() {
    let _guard = serial();
    let gpg = FakeGpg::new(
        r#"
echo $$ > "$WORK/pid"
trap '' TERM
while :; do sleep 1; done
"#,
    );
    let mut config = gpg.config();
    config.kill_grace = Duration::from_millis(300);
    let token = CancelToken::new().unwrap();
    let ctx = GpgContext::new(config).with_cancel_token(token.clone());

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        token.cancel();
    });
    let started = Instant::now();
    let err = ctx.export_keys(&[], true).unwrap_err();
    let elapsed = started.elapsed();
    canceller.join().unwrap();

    assert!(err.is_cancelled());
    // SIGTERM was ignored, so the grace period ran out before SIGKILL.
    assert!(elapsed >= Duration::from_millis(200 + 300), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");

    let pid: i32 = std::fs::read_to_string(gpg.work_dir().join("pid"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    let gone = kill(Pid::from_raw(pid), None).is_err();
    assert!(gone, "fake gpg {pid} still running");
}

#[test]
fn missing_executable_is_spawn_error() {
    let config = pgp_pipe_gpg::EngineConfig::default().with_executable("pgp-pipe-no-such-gpg");
    let err = import_keys(&config, b"key", None).unwrap_err();
    assert!(matches!(err, Error::Spawn { .. }));
}
