// error.rs — Error types for command operations.

use std::path::PathBuf;
use std::process::ExitStatus;

use attain_core::BuildError;
use thiserror::Error;

/// Errors raised while running external commands.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The command could not be started.
    #[error("spawning '{cmd}': {source}")]
    Spawn {
        cmd: String,
        source: std::io::Error,
    },

    /// The command ran and failed.
    #[error("command '{cmd}' failed: {status}")]
    Status { cmd: String, status: ExitStatus },

    /// A file redirection could not be opened.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A pipeline without commands cannot run.
    #[error("empty pipe")]
    EmptyPipe,

    /// A converter needs exactly one premise file and one result file.
    #[error("convert command requires one premise file and one result file, got {detail}")]
    BadConvert { detail: String },
}

impl ExecError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExecError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ExecError> for BuildError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Io { path, source } => BuildError::Io { path, source },
            other => BuildError::other(other),
        }
    }
}
