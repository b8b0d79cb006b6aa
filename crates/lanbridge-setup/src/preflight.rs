use lanbridge_core::{Error, Result};

use crate::config::PreflightConfig;
use crate::host::Host;

/// Run every precondition check. Nothing on the host is modified.
///
/// Order: required binaries, root privileges, free disk space. The first
/// failing check aborts with its diagnostic.
pub fn check(config: &PreflightConfig, host: &impl Host) -> Result<()> {
    check_dependencies(&config.required_binaries, host)?;
    ensure_root(host)?;
    check_disk_space(config, host)?;
    Ok(())
}

/// Every required binary must resolve on PATH.
pub fn check_dependencies(binaries: &[String], host: &impl Host) -> Result<()> {
    for binary in binaries {
        match host.which(binary) {
            Some(path) => tracing::debug!("found {binary} at {}", path.display()),
            None => {
                return Err(Error::precondition(format!(
                    "{binary} is not installed. Please install it by running 'sudo apt install {binary}'."
                )));
            }
        }
    }
    Ok(())
}

pub fn ensure_root(host: &impl Host) -> Result<()> {
    if host.is_root() {
        Ok(())
    } else {
        Err(Error::precondition("This script must be run as root!"))
    }
}

pub fn check_disk_space(config: &PreflightConfig, host: &impl Host) -> Result<()> {
    let free = host.free_space(&config.disk_path)?;
    tracing::debug!(
        "{} bytes free on {} (need {})",
        free,
        config.disk_path.display(),
        config.min_free_bytes
    );
    if free < config.min_free_bytes {
        return Err(Error::precondition(format!(
            "Insufficient disk space. At least {} GiB of free space is required.",
            config.min_free_bytes / (1024 * 1024 * 1024)
        )));
    }
    Ok(())
}
