use std::net::IpAddr;

use lanbridge_core::net::parse_route_source;
use lanbridge_core::{Endpoint, Result};

use crate::cmd::{Runner, Step};
use crate::host::Host;

/// Facts about the current invocation. Lives in memory only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub local_ip: IpAddr,
    pub user: String,
    pub endpoint: Option<Endpoint>,
}

impl Session {
    /// Detect the local address and the acting user.
    pub fn gather(runner: &impl Runner, host: &impl Host) -> Result<Self> {
        let route = runner.run(
            &Step::new("Detecting local IP address", "ip", &["route", "get", "1"])
                .failure("Failed to get local IP address."),
        )?;
        let local_ip = parse_route_source(&route.stdout)?;
        let user = host.acting_user()?;
        tracing::debug!("session: ip={local_ip}, user={user}");
        Ok(Self {
            local_ip,
            user,
            endpoint: None,
        })
    }

    /// Environment handed to `core.sh`.
    pub fn script_env(&self) -> [(&'static str, String); 2] {
        [("IP", self.local_ip.to_string()), ("CLIENT", self.user.clone())]
    }
}
