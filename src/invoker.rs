//! Abstraction over the OS process execution primitive.
//!
//! [`ProcessInvoker`] allows swapping the real subprocess execution
//! ([`SystemInvoker`]) with a mock in tests, so that the proxies built on top
//! of it can be checked without `mach` or `moz-phab` being installed.

use crate::error::CommandError;
use crate::output::{InvokeOptions, Output, StderrMode};
use std::io::{self, Read};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tracing::{debug, info};

/// Trait for running an executable to completion and capturing its output.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessInvoker: Send + Sync {
    /// Run `program` with `args` from `cwd`, blocking until it exits.
    ///
    /// Returns the captured output verbatim on success and
    /// [`CommandError::Failed`] carrying exit code and output on a nonzero
    /// exit.
    fn execute(
        &self,
        program: &Path,
        args: &[String],
        cwd: &Path,
        options: &InvokeOptions,
    ) -> Result<Output, CommandError>;
}

/// Default implementation that delegates to [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInvoker;

/// Render `program args…` the way a shell would accept it.
pub(crate) fn command_line(program: &Path, args: &[String]) -> String {
    let program = program.to_string_lossy();
    shell_words::join(std::iter::once(program.as_ref()).chain(args.iter().map(String::as_str)))
}

impl ProcessInvoker for SystemInvoker {
    fn execute(
        &self,
        program: &Path,
        args: &[String],
        cwd: &Path,
        options: &InvokeOptions,
    ) -> Result<Output, CommandError> {
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string_lossy().into_owned());
        info!("Running command:\n {}", command_line(program, args));

        let mut cmd = std::process::Command::new(program);
        cmd.args(args).current_dir(cwd).stdin(Stdio::null());
        for (key, value) in &options.env {
            cmd.env(key, value);
        }
        let captured = match options.stderr {
            StderrMode::Merge => output_merged(cmd),
            StderrMode::Inherit => cmd
                .stderr(Stdio::inherit())
                .output()
                .map(|raw| (raw.status, raw.stdout)),
            StderrMode::Discard => cmd
                .stderr(Stdio::null())
                .output()
                .map(|raw| (raw.status, raw.stdout)),
        };
        let (status, bytes) = captured.map_err(|source| CommandError::Spawn {
            command: name.clone(),
            source,
        })?;

        let output = Output::new(bytes);
        if status.success() {
            debug!("{} exited successfully", name);
            Ok(output)
        } else {
            Err(CommandError::Failed {
                command: name,
                exit_code: exit_code(status),
                output,
            })
        }
    }
}

/// Run `cmd` with stdout and stderr sharing one pipe, so that both streams
/// keep the order in which the tool wrote them.
fn output_merged(mut cmd: std::process::Command) -> io::Result<(ExitStatus, Vec<u8>)> {
    let (mut reader, writer) = io::pipe()?;
    cmd.stdout(writer.try_clone()?).stderr(writer);
    let mut child = cmd.spawn()?;
    // The command holds the write ends until dropped: no EOF otherwise.
    drop(cmd);
    let mut bytes = Vec::new();
    let read = reader.read_to_end(&mut bytes);
    let status = child.wait()?;
    read?;
    Ok((status, bytes))
}

/// Exit code of `status`, `-N` when the process was killed by signal `N`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}
