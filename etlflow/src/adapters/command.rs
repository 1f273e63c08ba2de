//! External command action.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use crate::context::{ActionContext, StageInputs};
use crate::core::StageKind;
use crate::errors::ActionError;
use crate::stages::{Action, ActionResult};

/// Runs a program for its side effects, such as unpacking an archive.
///
/// The program runs in the run's working directory unless `current_dir`
/// overrides it (relative overrides resolve against the working directory).
#[derive(Debug, Clone)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl ShellCommand {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Overrides the directory the program runs in.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Returns the command line, for diagnostics.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Action for ShellCommand {
    async fn execute(&self, _inputs: &StageInputs, ctx: &ActionContext) -> ActionResult {
        let dir = match &self.current_dir {
            Some(dir) => ctx.resolve(dir),
            None => ctx.working_dir().to_path_buf(),
        };
        debug!(stage = ctx.stage(), command = %self.command_line(), dir = %dir.display(), "spawning command");

        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ActionError::CommandFailed {
                command: self.command_line(),
                code: None,
                stderr: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(None);
        }
        Err(ActionError::CommandFailed {
            command: self.command_line(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    fn kind(&self) -> StageKind {
        StageKind::Command
    }
}
