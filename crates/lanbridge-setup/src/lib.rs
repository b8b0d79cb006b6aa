pub mod cmd;
pub mod config;
pub mod host;
pub mod install;
pub mod os;
pub mod preflight;
pub mod prompt;
pub mod provision;
pub mod revert;
pub mod session;
pub mod tunnel;

#[cfg(test)]
pub(crate) mod testing;
