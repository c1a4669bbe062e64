//! The command execution capability.
//!
//! The engine never spawns processes directly; it goes through [`Executor`]
//! so the namespace logic can be exercised with a scripted executor in tests,
//! and so a later redesign can move execution onto a worker without touching
//! the entry contract.

use std::path::PathBuf;
use std::process::Command;

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn shell: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("command exited with status {status}")]
    Failed { status: i32 },
}

/// Executes one command and captures its stdout.
///
/// Execution is synchronous and blocking: the calling thread is suspended for
/// the full duration of the external process. No timeout is imposed.
pub trait Executor: Send + Sync {
    fn execute(&self, command: &str) -> Result<Bytes, ExecError>;
}

/// Runs commands through `sh -c`, optionally in a fixed working directory.
///
/// Stdout is captured as the entry's data. Stderr is logged at debug level
/// and otherwise discarded.
pub struct ShellExecutor {
    workdir: Option<PathBuf>,
}

impl ShellExecutor {
    const SHELL: &'static str = "sh";

    #[must_use]
    pub fn new(workdir: Option<PathBuf>) -> Self {
        Self { workdir }
    }
}

impl Executor for ShellExecutor {
    fn execute(&self, command: &str) -> Result<Bytes, ExecError> {
        let mut cmd = Command::new(Self::SHELL);
        cmd.arg("-c").arg(command);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = cmd.output()?;

        if !output.stderr.is_empty() {
            debug!(
                command,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "command wrote to stderr"
            );
        }

        if output.status.success() {
            Ok(Bytes::from(output.stdout))
        } else {
            Err(ExecError::Failed {
                status: output.status.code().unwrap_or(-1),
            })
        }
    }
}

/// Diagnostic executor: returns the command text itself instead of running
/// it. Useful for exercising the namespace logic without side effects.
pub struct EchoExecutor;

impl Executor for EchoExecutor {
    fn execute(&self, command: &str) -> Result<Bytes, ExecError> {
        let mut text = Vec::with_capacity(command.len() + 1);
        text.extend_from_slice(command.as_bytes());
        text.push(b'\n');
        Ok(Bytes::from(text))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn echo_executor_returns_command_text_with_newline() {
        let out = EchoExecutor.execute("date").unwrap();
        assert_eq!(out.as_ref(), b"date\n");
    }

    #[test]
    fn shell_executor_captures_stdout() {
        let out = ShellExecutor::new(None).execute("printf hi").unwrap();
        assert_eq!(out.as_ref(), b"hi");
    }

    #[test]
    fn shell_executor_reports_nonzero_exit() {
        let err = ShellExecutor::new(None).execute("exit 3").unwrap_err();
        assert!(matches!(err, ExecError::Failed { status: 3 }));
    }

    #[test]
    fn shell_executor_respects_workdir() {
        let tmp = tempfile::tempdir().unwrap();
        let canonical = tmp.path().canonicalize().unwrap();
        let out = ShellExecutor::new(Some(canonical.clone()))
            .execute("pwd")
            .unwrap();
        let printed = String::from_utf8_lossy(&out);
        assert_eq!(printed.trim_end(), canonical.to_string_lossy());
    }
}
