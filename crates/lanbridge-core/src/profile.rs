//! OpenVPN client profile rewriting.
//!
//! The only field touched is the `remote <host> <port>` directive; the rest
//! of the file is written back byte for byte.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{NoExpand, Regex};

use crate::error::Result;
use crate::tunnels::Endpoint;

static REMOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"remote \S+ \S+").expect("static regex is valid"));

/// Conventional per-user profile location: `<home_root>/<user>/<user>.ovpn`.
pub fn profile_path(home_root: &Path, user: &str) -> PathBuf {
    home_root.join(user).join(format!("{user}.ovpn"))
}

/// Replace every `remote <host> <port>` directive with `endpoint`.
///
/// Returns the new content and the number of replaced directives.
pub fn rewrite_remote(content: &str, endpoint: &Endpoint) -> (String, usize) {
    let count = REMOTE_RE.find_iter(content).count();
    let replacement = format!("remote {} {}", endpoint.host, endpoint.port);
    let rewritten = REMOTE_RE.replace_all(content, NoExpand(&replacement));
    (rewritten.into_owned(), count)
}

/// Outcome of [`update_profile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileUpdate {
    /// File rewritten; number of `remote` directives replaced.
    Updated(usize),
    /// No profile at the given path. Not an error for the caller.
    Missing,
}

/// Read the profile, point its `remote` directive at `endpoint`, write it back.
pub fn update_profile(path: &Path, endpoint: &Endpoint) -> Result<ProfileUpdate> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ProfileUpdate::Missing),
        Err(e) => return Err(e.into()),
    };

    let (rewritten, count) = rewrite_remote(&content, endpoint);
    if count == 0 {
        tracing::warn!("{} has no `remote` directive; left unchanged", path.display());
    }
    fs::write(path, rewritten)?;
    Ok(ProfileUpdate::Updated(count))
}

/// Delete the profile if present. Returns whether a file was removed.
pub fn remove_profile(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = "client\n\
dev tun\n\
proto tcp\n\
remote old.host 1111\n\
resolv-retry infinite\n\
remote-cert-tls server\n\
<ca>\n\
-----BEGIN CERTIFICATE-----\n\
MIIB\n\
-----END CERTIFICATE-----\n\
</ca>\n";

    fn endpoint(host: &str, port: u16) -> Endpoint {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    #[test]
    fn rewrites_only_the_remote_line() {
        let (rewritten, count) = rewrite_remote(PROFILE, &endpoint("new.host", 2222));
        assert_eq!(count, 1);
        assert_eq!(rewritten, PROFILE.replace("remote old.host 1111", "remote new.host 2222"));
        assert!(rewritten.contains("remote-cert-tls server\n"));
    }

    #[test]
    fn rewrite_is_idempotent() {
        let target = endpoint("new.host", 2222);
        let (once, _) = rewrite_remote(PROFILE, &target);
        let (twice, _) = rewrite_remote(&once, &target);
        assert_eq!(once, twice);
    }

    #[test]
    fn replacement_is_literal() {
        let (rewritten, _) = rewrite_remote("remote a 1\n", &endpoint("$1.example", 9));
        assert_eq!(rewritten, "remote $1.example 9\n");
    }

    #[test]
    fn profile_path_follows_home_convention() {
        assert_eq!(
            profile_path(Path::new("/home"), "alice"),
            PathBuf::from("/home/alice/alice.ovpn")
        );
    }

    #[test]
    fn update_profile_round_trips_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("alice.ovpn");
        fs::write(&path, PROFILE).expect("write");

        let outcome = update_profile(&path, &endpoint("0.tcp.ngrok.io", 55123)).expect("update");
        assert_eq!(outcome, ProfileUpdate::Updated(1));

        let content = fs::read_to_string(&path).expect("read");
        assert!(content.contains("remote 0.tcp.ngrok.io 55123\n"));
        assert!(!content.contains("old.host"));
    }

    #[test]
    fn update_profile_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outcome =
            update_profile(&dir.path().join("nobody.ovpn"), &endpoint("h", 1)).expect("missing");
        assert_eq!(outcome, ProfileUpdate::Missing);
    }

    #[test]
    fn update_profile_without_remote_keeps_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bare.ovpn");
        fs::write(&path, "client\ndev tun\n").expect("write");

        let outcome = update_profile(&path, &endpoint("h", 1)).expect("update");
        assert_eq!(outcome, ProfileUpdate::Updated(0));
        assert_eq!(fs::read_to_string(&path).expect("read"), "client\ndev tun\n");
    }

    #[test]
    fn remove_profile_is_best_effort() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("alice.ovpn");
        fs::write(&path, PROFILE).expect("write");

        assert!(remove_profile(&path).expect("remove"));
        assert!(!path.exists());
        assert!(!remove_profile(&path).expect("second remove"));
    }
}
