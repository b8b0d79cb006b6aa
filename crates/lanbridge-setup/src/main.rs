use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;

use lanbridge_core::tracing_init::{default_filter, init_tracing};
use lanbridge_setup::cmd::SystemRunner;
use lanbridge_setup::config::{SetupArgs, SetupConfig};
use lanbridge_setup::host::SystemHost;
use lanbridge_setup::{provision, revert};

/// OpenVPN and ngrok setup tool.
#[derive(Debug, Parser)]
#[command(name = "lanbridge", version, about)]
struct Cli {
    /// Echo every command's output and enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Revert all changes made by a previous setup run
    #[arg(long, conflicts_with_all = ["core_script", "port", "status_url", "discovery_timeout"])]
    revert: bool,

    /// Run without interactive prompts (token from --authtoken / NGROK_AUTHTOKEN)
    #[arg(long)]
    non_interactive: bool,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,

    #[command(flatten)]
    setup: SetupArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(default_filter(cli.verbose), cli.log_json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("An error occurred: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let revert = cli.revert;
    let spinner = !cli.log_json;
    let config = SetupConfig::from_args(cli.setup, cli.verbose, cli.non_interactive);
    let runner = SystemRunner::new(config.verbose, spinner);
    let host = SystemHost;

    if revert {
        return revert::run(&config, &runner, &host).context("revert failed");
    }

    let shutdown = setup_ctrlc_handler()?;
    let setup_runner = runner.clone().with_interrupt(Arc::clone(&shutdown));
    let running =
        provision::start(&config, &setup_runner, &host, &shutdown).context("setup failed")?;
    // Teardown must still run once the flag is set.
    running.serve(&runner, &shutdown, config.idle_interval);
    Ok(())
}

/// First Ctrl+C/SIGTERM sets the shutdown flag: setup stops before its next
/// step, or the idle loop tears the tunnel down. A second one exits at once,
/// which also breaks out of a blocked prompt.
fn setup_ctrlc_handler() -> Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            tracing::warn!("received second interrupt, exiting immediately");
            std::process::exit(130);
        }
        tracing::info!("received interrupt, stopping (press Ctrl+C again to exit immediately)");
    })
    .context("failed to set Ctrl+C handler")?;
    Ok(shutdown)
}
