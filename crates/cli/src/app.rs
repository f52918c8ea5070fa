use crate::cli::{Cli, Commands};
use crate::json::ErrorJson;
use anyhow::{Context, Result};
use console::style;
use nix::sys::signal::{SigSet, Signal};
use pgp_pipe_gpg::{CancelToken, EngineConfig, GpgContext};

/// Cancellation is reported by exit code alone.
pub fn is_cancelled(error: &anyhow::Error) -> bool {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<pgp_pipe_gpg::Error>())
        .any(pgp_pipe_gpg::Error::is_cancelled)
}

/// Route SIGINT to a watcher thread: the first one cancels the running gpg,
/// the second exits at once.
///
/// Only SIGINT is blocked; the child inherits the mask and must still see
/// SIGTERM when the reaper sends it.
fn watch_interrupts(token: CancelToken) -> Result<()> {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.thread_block().context("Failed to block SIGINT")?;

    std::thread::Builder::new()
        .name("sigint".to_string())
        .spawn(move || {
            let mut seen = 0;
            while let Ok(signal) = mask.wait() {
                seen += 1;
                if seen > 1 {
                    std::process::exit(130);
                }
                tracing::debug!(signal = ?signal, "Interrupted, cancelling gpg");
                token.cancel();
            }
        })
        .context("Failed to start interrupt watcher")?;
    Ok(())
}

fn context(cli: &Cli) -> Result<GpgContext> {
    let mut config = EngineConfig::from_env();
    if let Some(gpg) = &cli.gpg {
        config = config.with_executable(gpg.clone());
    }
    if let Some(home) = &cli.homedir {
        config = config.with_home_dir(home.clone());
    }
    if cli.offline {
        config = config.with_online(false);
    }
    config.trace_status = cli.verbose;
    tracing::debug!(gpg = %config.program_name(), home = ?config.home_dir, online = config.online, "Engine configured");

    let token = CancelToken::new().context("Failed to create cancellation pipe")?;
    watch_interrupts(token.clone())?;
    Ok(GpgContext::new(config).with_cancel_token(token))
}

pub fn run(cli: Cli) -> Result<()> {
    let json = cli.json;

    let result = context(&cli).and_then(|ctx| match cli.command {
        Commands::Sign {
            input,
            output,
            signer,
            hash,
            armor,
            canonicalize,
        } => crate::commands::sign(&ctx, input, output, signer, &hash, armor, canonicalize, json),

        Commands::Verify {
            input,
            signature,
            canonicalize,
        } => crate::commands::verify(&ctx, input, signature, canonicalize, json),

        Commands::Encrypt {
            input,
            output,
            recipients,
            signer,
            binary,
            always_trust,
        } => crate::commands::encrypt(
            &ctx.with_always_trust(always_trust),
            input,
            output,
            recipients,
            signer,
            !binary,
            json,
        ),

        Commands::Decrypt { input, output } => crate::commands::decrypt(&ctx, input, output, json),

        Commands::Import { input } => crate::commands::import(&ctx, input, json),

        Commands::Export {
            keys,
            output,
            armor,
        } => crate::commands::export(&ctx, keys, output, armor, json),
    });

    if let Err(e) = &result {
        if is_cancelled(e) {
            tracing::debug!("Operation cancelled");
        } else if json {
            let causes: Vec<String> = e.chain().skip(1).map(|c| c.to_string()).collect();
            let payload = ErrorJson {
                status: "error",
                error: e.to_string(),
                causes,
            };
            println!("{}", serde_json::to_string(&payload)?);
        } else {
            eprintln!("\n{} {}", style("[ERROR]").red().bold(), style(&e).red());

            for (i, cause) in e.chain().skip(1).enumerate() {
                if i == 0 {
                    eprintln!("\n    Caused by:");
                }
                eprintln!("      - {}", style(cause).red());
            }
            eprintln!();
        }
    }

    result
}
