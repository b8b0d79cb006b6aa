use std::sync::atomic::AtomicBool;

use lanbridge_core::{Error, Probe, Result, check_interrupted};

use crate::cmd::{Runner, Step};
use crate::config::InstallConfig;
use crate::host::Host;

const EXHAUSTED_MESSAGE: &str =
    "Ngrok installation failed after multiple attempts. Please try installing manually.";

/// Whether snap and the ngrok binary are both already present.
pub fn is_installed(config: &InstallConfig, host: &impl Host) -> bool {
    host.which("snap").is_some() && host.exists(&config.ngrok_path)
}

/// Make sure snapd and ngrok are installed. No-op when both are present.
///
/// Stops with [`Error::Interrupted`] before the next step once `interrupt`
/// is set.
pub fn ensure_ngrok(
    config: &InstallConfig,
    runner: &impl Runner,
    host: &impl Host,
    interrupt: &AtomicBool,
) -> Result<()> {
    if is_installed(config, host) {
        tracing::info!(
            "snap and ngrok already installed ({}), skipping installation",
            config.ngrok_path.display()
        );
        return Ok(());
    }

    tracing::info!("Snap or Ngrok not found. Installing...");
    install_snapd(config, runner, interrupt)?;
    install_ngrok(config, runner, interrupt)?;

    if !host.exists(&config.ngrok_path) {
        return Err(Error::Verification(format!(
            "Ngrok installation failed: {} not found. Please install manually.",
            config.ngrok_path.display()
        )));
    }
    Ok(())
}

/// Install snapd, start its service and wait until it has seeded.
fn install_snapd(
    config: &InstallConfig,
    runner: &impl Runner,
    interrupt: &AtomicBool,
) -> Result<()> {
    check_interrupted(interrupt)?;
    runner.run(
        &Step::new("Installing snap", "apt", &["install", "-y", "snapd"])
            .env("DEBIAN_FRONTEND", "noninteractive")
            .failure("Failed to install snap"),
    )?;

    check_interrupted(interrupt)?;
    runner.run(
        &Step::new("Starting snapd service", "systemctl", &["start", "snapd.service"])
            .failure("Failed to start snapd service"),
    )?;

    tracing::info!("Waiting for snap to initialize...");
    let seeded = Step::new(
        "Checking snapd seeding",
        "snap",
        &["wait", "system", "seed.loaded"],
    );
    config
        .snapd_ready
        .wait_for("snapd to initialize", interrupt, || match runner.run(&seeded) {
            Ok(_) => Ok(Probe::Ready(())),
            Err(Error::Command { stderr, .. }) => Ok(Probe::Pending(stderr)),
            Err(e) => Err(e),
        })
}

/// `snap install ngrok`, retried per the configured policy.
pub fn install_ngrok(
    config: &InstallConfig,
    runner: &impl Runner,
    interrupt: &AtomicBool,
) -> Result<()> {
    let attempts = config.retry.max_attempts();
    config
        .retry
        .run(interrupt, |attempt| {
            runner.run(
                &Step::new(
                    format!("Installing ngrok (attempt {attempt}/{attempts})"),
                    "snap",
                    &["install", "ngrok"],
                )
                .failure("Failed to install ngrok"),
            )
        })
        .map(|_| ())
        .map_err(|last| match last {
            Error::Interrupted => last,
            last => Error::InstallExhausted {
                message: EXHAUSTED_MESSAGE.into(),
                attempts,
                last: Box::new(last),
            },
        })
}
