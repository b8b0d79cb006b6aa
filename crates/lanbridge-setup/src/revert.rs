use lanbridge_core::Result;
use lanbridge_core::profile::remove_profile;

use crate::cmd::{Runner, Step};
use crate::config::SetupConfig;
use crate::host::Host;
use crate::preflight;

/// Package removals, in the order they run.
pub fn reversal_steps() -> Vec<Step> {
    vec![
        Step::new("Removing ngrok", "snap", &["remove", "ngrok"]).failure("Failed to remove ngrok"),
        Step::new("Removing snap", "apt", &["remove", "--purge", "snapd", "-y"])
            .env("DEBIAN_FRONTEND", "noninteractive")
            .failure("Failed to remove snap"),
        Step::new("Removing OpenVPN", "apt", &["remove", "--purge", "openvpn", "-y"])
            .env("DEBIAN_FRONTEND", "noninteractive")
            .failure("Failed to remove OpenVPN"),
    ]
}

/// Undo a previous setup run.
///
/// Each removal is fatal on failure and later steps are not attempted.
/// Deleting the client profile afterwards is best-effort.
pub fn run(config: &SetupConfig, runner: &impl Runner, host: &impl Host) -> Result<()> {
    preflight::ensure_root(host)?;
    tracing::info!("Reverting changes...");

    for step in reversal_steps() {
        runner.run(&step)?;
    }

    remove_client_profile(config, host);

    tracing::info!("Revert process completed. All changes have been undone.");
    Ok(())
}

fn remove_client_profile(config: &SetupConfig, host: &impl Host) {
    let user = match host.acting_user() {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("cannot determine the client profile owner, skipping removal: {e}");
            return;
        }
    };
    let path = config.profile_path(&user);
    match remove_profile(&path) {
        Ok(true) => tracing::info!("Removed {}", path.display()),
        Ok(false) => tracing::debug!("{} not present, nothing to remove", path.display()),
        Err(e) => tracing::warn!("failed to remove {}: {e}", path.display()),
    }
}
