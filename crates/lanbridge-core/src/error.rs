//! Error types for the LANBridge provisioning steps.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the LANBridge `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Every way a provisioning or reversal run can fail.
///
/// Steps never exit the process themselves; they return one of these and
/// the binary's top-level handler picks the exit code.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing binary, insufficient privilege or insufficient disk space.
    #[error("{0}")]
    Precondition(String),

    /// External command could not be started at all.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// External command ran and exited unsuccessfully.
    #[error("{message} ({status})\nError output: {stderr}")]
    Command {
        message: String,
        status: String,
        stderr: String,
    },

    /// A retried step failed on every attempt.
    #[error("{message} (gave up after {attempts} attempts)")]
    InstallExhausted {
        message: String,
        attempts: u32,
        #[source]
        last: Box<Self>,
    },

    /// Post-install verification found the expected artifact missing.
    #[error("{0}")]
    Verification(String),

    /// Tunnel status response could not be turned into an endpoint.
    #[error("failed to discover tunnel endpoint: {0}")]
    Discovery(String),

    /// A readiness condition was not met within its deadline.
    #[error("timed out after {waited:?} waiting for {what}{}", last_error_suffix(.last))]
    Timeout {
        what: String,
        waited: Duration,
        last: Option<String>,
    },

    /// SIGINT/SIGTERM arrived before the tunnel was up. No further step is
    /// started once this is returned.
    #[error("interrupted before setup completed")]
    Interrupted,

    /// Interactive prompt failed (closed terminal, I/O error).
    #[error("prompt failed: {0}")]
    Prompt(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn last_error_suffix(last: &Option<String>) -> String {
    last.as_ref()
        .map_or_else(String::new, |reason| format!(" (last error: {reason})"))
}

impl Error {
    /// Shorthand for a precondition failure with a user-facing diagnostic.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_includes_stderr() {
        let err = Error::Command {
            message: "Failed to install snap".into(),
            status: "exit status: 100".into(),
            stderr: "E: Unable to locate package".into(),
        };
        let text = err.to_string();
        assert!(text.starts_with("Failed to install snap"));
        assert!(text.contains("Error output: E: Unable to locate package"));
    }

    #[test]
    fn timeout_error_mentions_last_reason() {
        let err = Error::Timeout {
            what: "tunnel endpoint".into(),
            waited: Duration::from_secs(30),
            last: Some("connection refused".into()),
        };
        assert_eq!(
            err.to_string(),
            "timed out after 30s waiting for tunnel endpoint (last error: connection refused)"
        );
    }

    #[test]
    fn timeout_error_without_reason() {
        let err = Error::Timeout {
            what: "snapd seeding".into(),
            waited: Duration::from_secs(5),
            last: None,
        };
        assert_eq!(err.to_string(), "timed out after 5s waiting for snapd seeding");
    }
}
