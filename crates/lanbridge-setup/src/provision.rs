//! Forward setup path: preconditions, install, authenticate, run the
//! OpenVPN installer, open the tunnel, rewrite the client profile, idle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use lanbridge_core::profile::{ProfileUpdate, update_profile};
use lanbridge_core::{Endpoint, Result, check_interrupted};

use crate::cmd::{Runner, Step};
use crate::config::SetupConfig;
use crate::host::Host;
use crate::session::Session;
use crate::tunnel::{self, TunnelProcess};
use crate::{install, os, preflight, prompt};

/// Everything up to (not including) starting the tunnel.
///
/// Preconditions run first; when they fail, no command has been executed.
/// Once `interrupt` is set no further step starts.
pub fn prepare(
    config: &SetupConfig,
    runner: &impl Runner,
    host: &impl Host,
    interrupt: &AtomicBool,
) -> Result<Session> {
    tracing::debug!("starting setup");
    preflight::check(&config.preflight, host)?;
    os::report_distribution();

    install::ensure_ngrok(&config.install, runner, host, interrupt)?;

    check_interrupted(interrupt)?;
    let token = prompt::prompt_authtoken(config.non_interactive, config.authtoken.as_deref())?;
    check_interrupted(interrupt)?;
    tunnel::configure_authtoken(&config.tunnel, runner, &token)?;

    check_interrupted(interrupt)?;
    let session = Session::gather(runner, host)?;
    prompt::show_recommended_config(session.local_ip, config.non_interactive)?;

    run_core_script(config, runner, &session, interrupt)?;
    Ok(session)
}

/// `chmod +x` the OpenVPN installer and run it attached to the terminal.
pub fn run_core_script(
    config: &SetupConfig,
    runner: &impl Runner,
    session: &Session,
    interrupt: &AtomicBool,
) -> Result<()> {
    let script = config.core_script.display().to_string();
    check_interrupted(interrupt)?;
    runner.run(
        &Step::new("Making core.sh executable", "chmod", &["+x", &script])
            .failure("Failed to make core.sh executable."),
    )?;

    let program = if config.core_script.components().count() == 1 {
        format!("./{script}")
    } else {
        script
    };
    let mut step = Step::new("Running core.sh script in interactive mode", program, &[])
        .failure("Failed to run core.sh");
    for (key, value) in session.script_env() {
        step = step.env(key, value);
    }
    check_interrupted(interrupt)?;
    runner.run_interactive(&step)?;
    check_interrupted(interrupt)
}

/// Point the acting user's client profile at the tunnel endpoint.
///
/// A missing profile is reported and the run continues.
pub fn apply_endpoint(config: &SetupConfig, session: &Session, endpoint: &Endpoint) -> Result<PathBuf> {
    let path = config.profile_path(&session.user);
    match update_profile(&path, endpoint)? {
        ProfileUpdate::Updated(_) => tracing::info!(
            "Updated {} with Ngrok host {} and port {}.",
            path.display(),
            endpoint.host,
            endpoint.port
        ),
        ProfileUpdate::Missing => tracing::warn!("{} does not exist.", path.display()),
    }
    Ok(path)
}

/// Block until `shutdown` is set, checking every `interval`.
pub fn wait_for_shutdown(shutdown: &AtomicBool, interval: Duration) {
    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(interval);
    }
}

/// A provisioned host with its tunnel up.
#[derive(Debug)]
pub struct Running {
    pub session: Session,
    pub profile: PathBuf,
    tunnel: TunnelProcess,
}

/// Forward path up to an established tunnel and a rewritten profile.
///
/// An interrupt received while preparing stops before the next step; the
/// tunnel is never started.
pub fn start(
    config: &SetupConfig,
    runner: &impl Runner,
    host: &impl Host,
    interrupt: &AtomicBool,
) -> Result<Running> {
    let mut session = prepare(config, runner, host, interrupt)?;
    let (tunnel, endpoint) = TunnelProcess::start(&config.tunnel, interrupt)?;
    let profile = apply_endpoint(config, &session, &endpoint)?;
    session.endpoint = Some(endpoint);
    tracing::debug!(?session, "session established");

    Ok(Running {
        session,
        profile,
        tunnel,
    })
}

impl Running {
    /// Idle until `shutdown` is set, then stop the tunnel.
    pub fn serve(self, runner: &impl Runner, shutdown: &AtomicBool, interval: Duration) {
        #[allow(clippy::print_stdout)]
        {
            println!();
            println!("Setup completed successfully!");
            println!();
            println!("  OpenVPN profile: {}", self.profile.display());
            if let Some(endpoint) = &self.session.endpoint {
                println!("  Forwarding to:   {endpoint}");
            }
            println!();
            println!("Ngrok tunnel is now running. Press Ctrl+C to stop.");
        }

        wait_for_shutdown(shutdown, interval);
        tracing::info!("Stopping Ngrok tunnel...");
        self.tunnel.stop(runner);
    }
}
