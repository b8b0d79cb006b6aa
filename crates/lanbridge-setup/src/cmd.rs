use std::fmt::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use lanbridge_core::{Error, Result, check_interrupted};

/// Stderr fragments that do not turn a successful command into a failure
/// but are worth surfacing as a warning.
pub const BENIGN_STDERR_PATTERNS: &[(&str, &str)] = &[(
    "Failed to fetch",
    "Some package lists failed to download. This may not be critical.",
)];

const SPINNER_TICK: Duration = Duration::from_millis(100);

/// A single external command the sequencer runs as one atomic unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub description: String,
    pub program: String,
    pub args: Vec<String>,
    /// Message reported when the command exits unsuccessfully.
    pub failure: String,
    pub envs: Vec<(String, String)>,
    /// Keep the arguments out of logs (credentials).
    pub sensitive: bool,
}

impl Step {
    pub fn new(description: impl Into<String>, program: impl Into<String>, args: &[&str]) -> Self {
        let description = description.into();
        Self {
            failure: format!("{description} failed"),
            description,
            program: program.into(),
            args: args.iter().map(ToString::to_string).collect(),
            envs: Vec::new(),
            sensitive: false,
        }
    }

    #[must_use]
    pub fn failure(mut self, message: impl Into<String>) -> Self {
        self.failure = message.into();
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Command line for logs; arguments are masked on sensitive steps.
    pub fn command_line(&self) -> String {
        if self.sensitive {
            return format!("{} <redacted>", self.program);
        }
        let mut line = String::new();
        for (key, value) in &self.envs {
            let _ = write!(line, "{key}={value} ");
        }
        line.push_str(&self.program);
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }
}

/// Captured result of a successful step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Set when stderr matched an entry of [`BENIGN_STDERR_PATTERNS`].
    pub warning: Option<String>,
}

/// Executes steps. Implemented by [`SystemRunner`] and by test fakes.
pub trait Runner {
    /// Run to completion with captured output.
    fn run(&self, step: &Step) -> Result<CommandOutput>;

    /// Run attached to the terminal (stdin/stdout/stderr inherited).
    fn run_interactive(&self, step: &Step) -> Result<()>;
}

/// Runs steps as real child processes.
///
/// With an interrupt flag attached, no step starts once the flag is set and
/// a step that fails after it was set (typically killed by the same Ctrl+C)
/// is reported as [`Error::Interrupted`].
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    verbose: bool,
    spinner: bool,
    interrupt: Arc<AtomicBool>,
}

impl SystemRunner {
    pub fn new(verbose: bool, spinner: bool) -> Self {
        Self {
            verbose,
            spinner,
            interrupt: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Replace a failure caused by a pending interrupt.
    fn interrupted_or<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Err(e) => {
                check_interrupted(&self.interrupt)?;
                Err(e)
            }
            ok => ok,
        }
    }

    /// Echo captured streams in verbose mode.
    fn echo(&self, stdout: &str, stderr: &str) {
        if self.verbose {
            tracing::info!("command output:\n{stdout}");
            tracing::info!("command errors:\n{stderr}");
        }
    }
}

impl Runner for SystemRunner {
    fn run(&self, step: &Step) -> Result<CommandOutput> {
        check_interrupted(&self.interrupt)?;
        tracing::info!("{}...", step.description);
        tracing::debug!("exec: {}", step.command_line());

        let output = {
            let _spinner = Spinner::start(&step.description, self.spinner);
            step.command()
                .stdin(Stdio::null())
                .output()
                .map_err(|source| Error::Spawn {
                    program: step.program.clone(),
                    source,
                })?
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        self.echo(&stdout, &stderr);

        self.interrupted_or(classify(
            step,
            output.status.success(),
            &output.status.to_string(),
            stdout,
            stderr,
        ))
    }

    fn run_interactive(&self, step: &Step) -> Result<()> {
        check_interrupted(&self.interrupt)?;
        tracing::info!("{}...", step.description);
        tracing::debug!("exec (interactive): {}", step.command_line());

        let status = step.command().status().map_err(|source| Error::Spawn {
            program: step.program.clone(),
            source,
        })?;

        if !status.success() {
            return self.interrupted_or(Err(Error::Command {
                message: step.failure.clone(),
                status: status.to_string(),
                stderr: String::new(),
            }));
        }
        tracing::info!("{} completed successfully.", step.description);
        Ok(())
    }
}

/// Turn a finished process into the step outcome.
///
/// A nonzero exit is always an error, even if stderr only carries a benign
/// pattern.
pub fn classify(
    step: &Step,
    success: bool,
    status: &str,
    stdout: String,
    stderr: String,
) -> Result<CommandOutput> {
    if !success {
        tracing::debug!("command failed: {}\nstderr: {stderr}", step.command_line());
        return Err(Error::Command {
            message: step.failure.clone(),
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }

    let warning = BENIGN_STDERR_PATTERNS
        .iter()
        .find(|(pattern, _)| stderr.contains(pattern))
        .map(|(_, note)| (*note).to_string());

    match &warning {
        Some(note) => tracing::warn!("Warning: {note}\nOutput: {}", stderr.trim()),
        None => tracing::info!("{} completed successfully.", step.description),
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        warning,
    })
}

/// Terminal spinner shown while a step runs.
///
/// The ticker thread lives inside the progress bar; dropping the guard
/// stops it and clears the line, so every exit path cleans up.
struct Spinner(Option<ProgressBar>);

#[cfg(test)]
thread_local! {
    static LIVE_SPINNERS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

impl Spinner {
    fn start(description: &str, enabled: bool) -> Self {
        if !enabled {
            return Self(None);
        }
        #[cfg(test)]
        LIVE_SPINNERS.with(|n| n.set(n.get() + 1));
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("-/|\\ ");
        let bar = ProgressBar::new_spinner().with_style(style);
        bar.set_message(format!("{description}..."));
        bar.enable_steady_tick(SPINNER_TICK);
        Self(Some(bar))
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(bar) = self.0.take() {
            bar.finish_and_clear();
            #[cfg(test)]
            LIVE_SPINNERS.with(|n| n.set(n.get().saturating_sub(1)));
        }
    }
}
