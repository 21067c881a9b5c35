//! Process execution boundary.
//!
//! Everything libforge does to the outside world (compilers, `cmake`, `git`,
//! `otool`, `lipo`, `xcodebuild`, `codesign`) goes through a
//! [`CommandRunner`]: run an argv, return its stdout, fail on nonzero exit.
//! [`SystemRunner`] is the real implementation; tests substitute a recording
//! runner so no host tool is ever required.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::types::ForgeError;

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    env: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
    streaming: bool,
}

impl Invocation {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
            streaming: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Adds an environment variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Inherit stdio instead of capturing it. Used for long-running build
    /// drivers whose output the user wants to watch.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Program followed by its arguments, lossily converted for display and
    /// inspection.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv().join(" "))
    }
}

/// Runs an argv, returns stdout, fails on nonzero exit.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<String, ForgeError>;

    /// Runs the command and returns its stdout with surrounding whitespace
    /// removed. Handy for tools that print a single path.
    fn run_trimmed(&self, invocation: &Invocation) -> Result<String, ForgeError> {
        Ok(self.run(invocation)?.trim().to_string())
    }
}

/// Executes commands on the host with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<String, ForgeError> {
        let description = invocation.to_string();
        match invocation.working_dir() {
            Some(dir) => debug!(command = %description, cwd = %dir.display(), "spawning"),
            None => debug!(command = %description, "spawning"),
        }
        let mut cmd = invocation.to_command();

        if invocation.is_streaming() {
            let status = cmd
                .stdin(Stdio::null())
                .status()
                .map_err(|source| ForgeError::Spawn {
                    description: description.clone(),
                    source,
                })?;
            if !status.success() {
                return Err(ForgeError::Command {
                    description,
                    status: status.to_string(),
                    stdout: String::new(),
                    stderr: String::new(),
                });
            }
            return Ok(String::new());
        }

        let output = cmd.output().map_err(|source| ForgeError::Spawn {
            description: description.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(ForgeError::Command {
                description,
                status: output.status.to_string(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
pub(crate) use recording::RecordingRunner;

#[cfg(test)]
mod recording {
    use std::cell::RefCell;

    use super::*;

    type Responder = Box<dyn Fn(&Invocation) -> Result<String, ForgeError>>;

    /// Records every invocation and answers from a scripted closure.
    pub(crate) struct RecordingRunner {
        calls: RefCell<Vec<Invocation>>,
        respond: Responder,
    }

    impl RecordingRunner {
        pub(crate) fn new() -> Self {
            Self::with_responder(|_| Ok(String::new()))
        }

        pub(crate) fn with_responder(
            respond: impl Fn(&Invocation) -> Result<String, ForgeError> + 'static,
        ) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                respond: Box::new(respond),
            }
        }

        pub(crate) fn argvs(&self) -> Vec<Vec<String>> {
            self.calls.borrow().iter().map(Invocation::argv).collect()
        }

        pub(crate) fn calls(&self) -> Vec<Invocation> {
            self.calls.borrow().clone()
        }

        pub(crate) fn count(&self, program: &str) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|c| c.program() == OsStr::new(program))
                .count()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, invocation: &Invocation) -> Result<String, ForgeError> {
            self.calls.borrow_mut().push(invocation.clone());
            (self.respond)(invocation)
        }
    }
}
