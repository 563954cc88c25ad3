//! Errors raised while invoking an external tool.
use crate::output::Output;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error returned by every [`Tool`](crate::Tool) invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The tool ran and exited with a nonzero status.
    #[error("{command} failed with exit code {exit_code}")]
    Failed {
        /// Tool name
        command: String,
        /// Process exit code, `-N` when killed by signal `N`
        exit_code: i32,
        /// Output captured up to the failure
        output: Output,
    },
    /// The process could not be started at all.
    #[error("Unable to execute {command}")]
    Spawn {
        /// Tool name
        command: String,
        #[source]
        #[allow(missing_docs)]
        source: io::Error,
    },
    /// `run` was called without a subcommand.
    #[error("No subcommand given to {command}")]
    MissingSubcommand {
        /// Tool name
        command: String,
    },
    /// The cache directory could not be removed after an invocation.
    #[error("Unable to remove cache directory {path:?}")]
    Cleanup {
        /// Directory that was being removed
        path: PathBuf,
        #[source]
        #[allow(missing_docs)]
        source: io::Error,
    },
}

impl CommandError {
    /// Exit code of a failed invocation.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Failed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Output captured by a failed invocation.
    pub fn output(&self) -> Option<&Output> {
        match self {
            CommandError::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}

#[cfg(test)]
mod should {
    use super::*;

    #[test]
    fn expose_failure_details() {
        let e = CommandError::Failed {
            command: "mach".into(),
            exit_code: 2,
            output: "boom".into(),
        };
        assert_eq!(e.to_string(), "mach failed with exit code 2");
        assert_eq!(e.exit_code(), Some(2));
        assert_eq!(e.output(), Some(&Output::from("boom")));
    }

    #[test]
    fn have_no_exit_code_for_contract_violation() {
        let e = CommandError::MissingSubcommand {
            command: "wpt".into(),
        };
        assert_eq!(e.exit_code(), None);
        assert!(e.output().is_none());
    }
}
