//! LANBridge Core Library
//!
//! Host-independent pieces of the LANBridge provisioning tool:
//! - Error taxonomy shared by every provisioning step
//! - Retry and readiness-polling policies
//! - Tunnel status API parsing
//! - OpenVPN profile rewriting

pub mod error;
pub mod net;
pub mod profile;
pub mod retry;
pub mod tracing_init;
pub mod tunnels;

pub use error::{Error, Result};
pub use retry::{PollPolicy, Probe, RetryPolicy, check_interrupted, sleep_unless_interrupted};
pub use tunnels::Endpoint;
