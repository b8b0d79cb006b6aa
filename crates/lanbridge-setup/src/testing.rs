//! In-memory runner and host used by the unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lanbridge_core::{Error, Result};

use crate::cmd::{CommandOutput, Runner, Step};
use crate::host::Host;

/// Records every step and fails scripted commands.
///
/// Commands are keyed by `program arg1 arg2 ...`.
#[derive(Debug, Default)]
pub struct FakeRunner {
    calls: RefCell<Vec<Step>>,
    failures: RefCell<HashMap<String, usize>>,
    outputs: HashMap<String, String>,
    interrupts: HashMap<String, Arc<AtomicBool>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` invocations of `command`.
    pub fn fail(self, command: &str, times: usize) -> Self {
        self.failures.borrow_mut().insert(command.to_string(), times);
        self
    }

    pub fn always_fail(self, command: &str) -> Self {
        self.fail(command, usize::MAX)
    }

    pub fn stdout(mut self, command: &str, stdout: &str) -> Self {
        self.outputs.insert(command.to_string(), stdout.to_string());
        self
    }

    /// Set `flag` while `command` runs and report it interrupted, as
    /// `SystemRunner` does for a child killed by the terminal's Ctrl+C.
    pub fn interrupt_on(mut self, command: &str, flag: Arc<AtomicBool>) -> Self {
        self.interrupts.insert(command.to_string(), flag);
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls.borrow().iter().map(key).collect()
    }

    pub fn steps(&self) -> Vec<Step> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| *c == command).count()
    }

    fn invoke(&self, step: &Step) -> Result<String> {
        self.calls.borrow_mut().push(step.clone());
        let command = key(step);
        if let Some(flag) = self.interrupts.get(&command) {
            flag.store(true, Ordering::SeqCst);
            return Err(Error::Interrupted);
        }
        if let Some(remaining) = self.failures.borrow_mut().get_mut(&command)
            && *remaining > 0
        {
            *remaining = remaining.saturating_sub(1);
            return Err(Error::Command {
                message: step.failure.clone(),
                status: "exit status: 1".into(),
                stderr: format!("scripted failure of {command}"),
            });
        }
        Ok(self.outputs.get(&command).cloned().unwrap_or_default())
    }
}

fn key(step: &Step) -> String {
    std::iter::once(step.program.as_str())
        .chain(step.args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Runner for FakeRunner {
    fn run(&self, step: &Step) -> Result<CommandOutput> {
        let stdout = self.invoke(step)?;
        Ok(CommandOutput {
            stdout,
            ..CommandOutput::default()
        })
    }

    fn run_interactive(&self, step: &Step) -> Result<()> {
        self.invoke(step).map(|_| ())
    }
}

/// Host with scripted binaries, privileges, disk and files.
#[derive(Debug)]
pub struct FakeHost {
    pub installed: Vec<String>,
    pub root: bool,
    pub free: u64,
    pub files: RefCell<HashSet<PathBuf>>,
    pub user: String,
}

impl FakeHost {
    /// Root, 10 GiB free, `openvpn` installed, nothing else.
    pub fn healthy() -> Self {
        Self {
            installed: vec!["openvpn".into()],
            root: true,
            free: 10 * 1024 * 1024 * 1024,
            files: RefCell::new(HashSet::new()),
            user: "alice".into(),
        }
    }

    pub fn with_binary(mut self, name: &str) -> Self {
        self.installed.push(name.into());
        self
    }

    pub fn with_file(self, path: impl Into<PathBuf>) -> Self {
        self.files.borrow_mut().insert(path.into());
        self
    }
}

impl Host for FakeHost {
    fn which(&self, program: &str) -> Option<PathBuf> {
        self.installed
            .iter()
            .any(|p| p == program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }

    fn is_root(&self) -> bool {
        self.root
    }

    fn free_space(&self, _path: &Path) -> Result<u64> {
        Ok(self.free)
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.borrow().contains(path)
    }

    fn acting_user(&self) -> Result<String> {
        Ok(self.user.clone())
    }
}
