//! Scoped child processes.
//!
//! Every tool is spawned with `kill_on_drop`, so a timeout, an error or a
//! cancelled scan never leaves a Chrome or traceroute process behind.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::ProbeError;

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal.
    pub code: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` if the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Converts a non-zero exit into [`ProbeError::NonZeroExit`].
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::NonZeroExit`] unless the exit code was 0.
    pub fn check(self, program: &str) -> Result<Self, ProbeError> {
        if self.success() {
            return Ok(self);
        }
        Err(ProbeError::NonZeroExit {
            program: program.to_string(),
            status: self
                .code
                .map_or_else(|| "signal".to_string(), |c| format!("code {c}")),
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Runs `program` with `args`, writes `input` to its stdin (or closes
/// stdin immediately), and waits up to `timeout` for it to exit.
///
/// The exit code is not interpreted; see [`CommandOutput::check`].
///
/// # Errors
///
/// Returns [`ProbeError::Spawn`] if the process cannot start and
/// [`ProbeError::Timeout`] if it is still running at the deadline (the
/// process is killed).
pub async fn run_command(
    program: &str,
    args: &[String],
    input: Option<&[u8]>,
    timeout: Duration,
) -> Result<CommandOutput, ProbeError> {
    let spawn_err = |e: std::io::Error| ProbeError::Spawn {
        program: program.to_string(),
        reason: e.to_string(),
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(spawn_err)?;

    if let Some(mut stdin) = child.stdin.take() {
        if let Some(bytes) = input {
            // A tool that exits without reading its input is not an error.
            let _ = stdin.write_all(bytes).await;
        }
        drop(stdin);
    }

    tracing::debug!(program, ?args, "process spawned");

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
        .map_err(spawn_err)?;

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(all(test, unix))]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let Ok(out) = run_command(
            "sh",
            &["-c".to_string(), "echo hello; exit 3".to_string()],
            None,
            Duration::from_secs(5),
        )
        .await
        else {
            panic!("sh should run");
        };
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert!(matches!(
            out.check("sh"),
            Err(ProbeError::NonZeroExit { .. })
        ));
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let Ok(out) = run_command("cat", &[], Some(b"piped"), Duration::from_secs(5)).await
        else {
            panic!("cat should run");
        };
        assert!(out.success());
        assert_eq!(out.stdout, "piped");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let result = run_command(
            "definitely-not-a-real-binary-7f3a",
            &[],
            None,
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(ProbeError::Spawn { .. })));
    }

    #[tokio::test]
    async fn slow_process_times_out() {
        let result = run_command(
            "sleep",
            &["5".to_string()],
            None,
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(result, Err(ProbeError::Timeout(_))));
    }
}
