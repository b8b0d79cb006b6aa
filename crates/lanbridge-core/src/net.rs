//! Local address discovery helpers.

use std::net::IpAddr;

use crate::error::{Error, Result};

/// Extract the preferred source address from `ip route get <dst>` output.
///
/// ```text
/// 1.0.0.0 via 192.168.1.1 dev eth0 src 192.168.1.23 uid 0
/// ```
pub fn parse_route_source(output: &str) -> Result<IpAddr> {
    let mut tokens = output.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "src" {
            let addr = tokens
                .next()
                .ok_or_else(|| Error::Precondition("`src` without address in route output".into()))?;
            return addr.parse().map_err(|_| {
                Error::Precondition(format!("invalid source address in route output: {addr}"))
            });
        }
    }
    Err(Error::Precondition(format!(
        "failed to get local IP address: no `src` in route output: {}",
        output.trim()
    )))
}
