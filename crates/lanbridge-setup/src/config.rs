use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use lanbridge_core::{PollPolicy, RetryPolicy};

/// Tunnel client install location when installed through snap.
pub const DEFAULT_NGROK_PATH: &str = "/snap/bin/ngrok";
/// Local tunnel client status API.
pub const DEFAULT_STATUS_URL: &str = "http://localhost:4040/api/tunnels";
/// OpenVPN listen port exposed through the tunnel.
pub const DEFAULT_VPN_PORT: u16 = 1194;
/// Binaries that must be installed before anything is touched.
pub const REQUIRED_BINARIES: &[&str] = &["openvpn"];
/// Minimum free space on the root filesystem (2 GiB).
pub const MIN_FREE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Options shared by the setup flow. Flattened into the top-level CLI.
#[derive(Debug, Args)]
pub struct SetupArgs {
    /// ngrok auth token (prompted for when omitted)
    #[arg(long, env = "NGROK_AUTHTOKEN", hide_env_values = true)]
    pub authtoken: Option<String>,

    /// OpenVPN installer script run between dependency install and tunnel start
    #[arg(long, default_value = "core.sh")]
    pub core_script: PathBuf,

    /// Path to the ngrok binary
    #[arg(long, default_value = DEFAULT_NGROK_PATH)]
    pub ngrok_path: PathBuf,

    /// Local port to expose through the tunnel
    #[arg(long, default_value_t = DEFAULT_VPN_PORT)]
    pub port: u16,

    /// ngrok local status API
    #[arg(long, default_value = DEFAULT_STATUS_URL)]
    pub status_url: String,

    /// Directory holding per-user home directories (profile lives at <home-root>/<user>/<user>.ovpn)
    #[arg(long, default_value = "/home")]
    pub home_root: PathBuf,

    /// Seconds to wait for the tunnel to report its public endpoint
    #[arg(long, default_value_t = 30)]
    pub discovery_timeout: u64,
}

/// Precondition thresholds.
#[derive(Debug, Clone)]
pub struct PreflightConfig {
    pub required_binaries: Vec<String>,
    pub min_free_bytes: u64,
    /// Filesystem whose free space is checked.
    pub disk_path: PathBuf,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            required_binaries: REQUIRED_BINARIES.iter().map(ToString::to_string).collect(),
            min_free_bytes: MIN_FREE_BYTES,
            disk_path: PathBuf::from("/"),
        }
    }
}

/// Installer settings.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    pub ngrok_path: PathBuf,
    /// Retry policy for `snap install ngrok`.
    pub retry: RetryPolicy,
    /// How long to wait for snapd to finish seeding after it is started.
    pub snapd_ready: PollPolicy,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            ngrok_path: PathBuf::from(DEFAULT_NGROK_PATH),
            retry: RetryPolicy::new(3, Duration::from_secs(10)),
            snapd_ready: PollPolicy::new(
                Duration::from_secs(60),
                Duration::from_millis(500),
                Duration::from_secs(5),
            ),
        }
    }
}

/// Tunnel client settings.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub ngrok_path: PathBuf,
    pub port: u16,
    pub status_url: String,
    pub request_timeout: Duration,
    pub discovery: PollPolicy,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            ngrok_path: PathBuf::from(DEFAULT_NGROK_PATH),
            port: DEFAULT_VPN_PORT,
            status_url: DEFAULT_STATUS_URL.to_string(),
            request_timeout: Duration::from_secs(5),
            discovery: PollPolicy::new(
                Duration::from_secs(30),
                Duration::from_millis(250),
                Duration::from_secs(2),
            ),
        }
    }
}

/// Everything a run needs, built once from the CLI and passed down.
#[derive(Debug, Clone)]
pub struct SetupConfig {
    pub verbose: bool,
    pub non_interactive: bool,
    pub authtoken: Option<String>,
    pub core_script: PathBuf,
    pub home_root: PathBuf,
    pub idle_interval: Duration,
    pub preflight: PreflightConfig,
    pub install: InstallConfig,
    pub tunnel: TunnelConfig,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            non_interactive: false,
            authtoken: None,
            core_script: PathBuf::from("core.sh"),
            home_root: PathBuf::from("/home"),
            idle_interval: Duration::from_secs(1),
            preflight: PreflightConfig::default(),
            install: InstallConfig::default(),
            tunnel: TunnelConfig::default(),
        }
    }
}

impl SetupConfig {
    pub fn from_args(args: SetupArgs, verbose: bool, non_interactive: bool) -> Self {
        let defaults = Self::default();
        Self {
            verbose,
            non_interactive,
            authtoken: args.authtoken,
            core_script: args.core_script,
            home_root: args.home_root,
            install: InstallConfig {
                ngrok_path: args.ngrok_path.clone(),
                ..defaults.install
            },
            tunnel: TunnelConfig {
                ngrok_path: args.ngrok_path,
                port: args.port,
                status_url: args.status_url,
                discovery: PollPolicy {
                    timeout: Duration::from_secs(args.discovery_timeout),
                    ..defaults.tunnel.discovery
                },
                ..defaults.tunnel
            },
            ..defaults
        }
    }

    /// Profile path for `user` under the configured home root.
    pub fn profile_path(&self, user: &str) -> PathBuf {
        lanbridge_core::profile::profile_path(&self.home_root, user)
    }
}
