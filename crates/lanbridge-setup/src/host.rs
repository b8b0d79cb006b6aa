//! Read-only facts about the machine being provisioned.

use std::path::{Path, PathBuf};

use lanbridge_core::{Error, Result};
use nix::sys::statvfs::statvfs;
use nix::unistd::{Uid, User, geteuid};

/// Host queries used by the precondition checker, the installer and the
/// reversal sequencer. Kept behind a trait so sequencing can be tested
/// without touching the real machine.
pub trait Host {
    /// Resolve `program` on PATH.
    fn which(&self, program: &str) -> Option<PathBuf>;

    /// Whether the effective UID is root.
    fn is_root(&self) -> bool;

    /// Bytes available to unprivileged users on the filesystem holding `path`.
    fn free_space(&self, path: &Path) -> Result<u64>;

    fn exists(&self, path: &Path) -> bool;

    /// The user the setup is performed for (the sudo caller when elevated).
    fn acting_user(&self) -> Result<String>;
}

/// The machine this process runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl Host for SystemHost {
    fn which(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    fn is_root(&self) -> bool {
        geteuid().is_root()
    }

    fn free_space(&self, path: &Path) -> Result<u64> {
        let stat = statvfs(path).map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "statvfs {} failed: {e}",
                path.display()
            )))
        })?;
        #[allow(clippy::unnecessary_cast, clippy::useless_conversion)]
        let free = (stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64);
        Ok(free)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn acting_user(&self) -> Result<String> {
        if let Ok(user) = std::env::var("SUDO_USER")
            && !user.is_empty()
        {
            return Ok(user);
        }
        let uid = Uid::current();
        let user = User::from_uid(uid)
            .map_err(|e| Error::Precondition(format!("failed to look up user {uid}: {e}")))?
            .ok_or_else(|| Error::Precondition(format!("no passwd entry for uid {uid}")))?;
        Ok(user.name)
    }
}
