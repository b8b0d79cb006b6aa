//! Tunnel client status API types.
//!
//! The tunnel client serves `GET /api/tunnels` on its local web interface:
//!
//! ```json
//! {"tunnels":[{"name":"command_line","public_url":"tcp://0.tcp.ngrok.io:55123","proto":"tcp"}]}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Body of the status endpoint. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelList {
    #[serde(default)]
    pub tunnels: Vec<Tunnel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tunnel {
    #[serde(default)]
    pub name: Option<String>,
    pub public_url: String,
    #[serde(default)]
    pub proto: Option<String>,
}

/// Public host and port assigned to a tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    /// Parse `tcp://<host>:<port>` (the scheme is optional).
    fn from_str(url: &str) -> Result<Self> {
        let rest = url.trim();
        let rest = rest.strip_prefix("tcp://").unwrap_or(rest);
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| Error::Discovery(format!("public URL has no port: {url}")))?;
        if host.is_empty() || host.contains('/') {
            return Err(Error::Discovery(format!("public URL has no host: {url}")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::Discovery(format!("invalid port in public URL: {url}")))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl TunnelList {
    /// Parse a status endpoint response body.
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body)
            .map_err(|e| Error::Discovery(format!("malformed tunnel status response: {e}")))
    }

    /// Endpoint of the first listed tunnel, `None` while the list is empty.
    pub fn first_endpoint(&self) -> Result<Option<Endpoint>> {
        self.tunnels
            .first()
            .map(|tunnel| tunnel.public_url.parse())
            .transpose()
    }
}
