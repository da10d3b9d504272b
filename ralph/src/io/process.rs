//! Helpers for running child processes and capturing their output.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument};

use crate::error::RalphError;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Exit code, or `-1` when the child was terminated by a signal.
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run a command to completion and capture stdout/stderr in full.
///
/// Both pipes are drained on reader threads while stdin is written, so a
/// child that produces output before consuming all of its input cannot
/// deadlock. There is no time limit.
///
/// On unix the child runs in its own process group, so a terminal Ctrl-C
/// reaches only ralph's stop handler and the child runs to completion.
#[instrument(skip_all, fields(program = %cmd.get_program().to_string_lossy()))]
pub fn run_captured(mut cmd: Command, stdin: Option<&[u8]>) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = cmd.spawn().map_err(|source| {
        error!(err = %source, "failed to spawn command");
        RalphError::LaunchFailed {
            program: cmd.get_program().to_string_lossy().into_owned(),
            source,
        }
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream(stdout));
    let stderr_handle = thread::spawn(move || read_stream(stderr));

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        // Broken pipe: the child exited before reading all input.
        if let Err(err) = child_stdin.write_all(input) {
            debug!(err = %err, "child closed stdin early");
        }
    }

    let status = child.wait().context("wait for command")?;
    let stdout = join_output(stdout_handle).context("join stdout")?;
    let stderr = join_output(stderr_handle).context("join stderr")?;

    debug!(exit_code = ?status.code(), "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
    })
}

/// Run a command attached to the operator's terminal and return its exit code.
#[instrument(skip_all, fields(program = %cmd.get_program().to_string_lossy()))]
pub fn run_inherited(mut cmd: Command) -> Result<i32> {
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    let status = cmd.status().map_err(|source| RalphError::LaunchFailed {
        program: cmd.get_program().to_string_lossy().into_owned(),
        source,
    })?;
    Ok(status.code().unwrap_or(-1))
}

fn join_output(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(buf)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdin_echo_and_both_streams() {
        let output = run_captured(sh("cat; echo oops >&2; exit 3"), Some(b"hello prompt"))
            .expect("run");
        assert_eq!(output.stdout_lossy(), "hello prompt");
        assert_eq!(output.stderr_lossy(), "oops\n");
        assert_eq!(output.exit_code(), 3);
    }

    #[test]
    fn large_output_does_not_deadlock() {
        let output = run_captured(
            sh("head -c 300000 /dev/zero | tr '\\0' 'x'; head -c 300000 /dev/zero | tr '\\0' 'y' >&2"),
            None,
        )
        .expect("run");
        assert_eq!(output.stdout.len(), 300_000);
        assert_eq!(output.stderr.len(), 300_000);
    }

    #[test]
    fn signal_termination_reports_minus_one() {
        let output = run_captured(sh("kill -9 $$"), None).expect("run");
        assert_eq!(output.exit_code(), -1);
    }

    #[test]
    fn missing_program_is_launch_failure() {
        let err = run_captured(Command::new("ralph-definitely-not-a-program"), Some(b"x"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RalphError>(),
            Some(RalphError::LaunchFailed { program, .. }) if program == "ralph-definitely-not-a-program"
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn captured_child_leads_its_own_process_group() {
        let output = run_captured(sh("echo $$; cut -d' ' -f5 /proc/$$/stat"), None)
            .expect("run");
        let stdout = output.stdout_lossy();
        let lines: Vec<&str> = stdout.lines().map(str::trim).collect();
        assert_eq!(lines.len(), 2, "unexpected output: {stdout}");
        assert_eq!(lines[0], lines[1]);
    }
}
