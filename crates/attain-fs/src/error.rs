// error.rs — Error types for the filesystem artefacts.

use std::path::PathBuf;

use attain_core::BuildError;
use thiserror::Error;

/// Errors raised by filesystem artefacts and operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A file artefact resolved to a directory.
    #[error("artefact {path} is a directory")]
    IsDirectory { path: PathBuf },

    /// A directory artefact resolved to something else.
    #[error("{path} is no directory")]
    NotADirectory { path: PathBuf },

    /// An invalid glob pattern was used in a name filter.
    #[error("invalid name pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// A copy premise or result has an artefact kind the operation cannot
    /// handle.
    #[error("FS copy: illegal {role} artefact '{name}' of kind {kind}")]
    IllegalCopyArtefact {
        role: &'static str,
        name: String,
        kind: &'static str,
    },

    /// A copy target lies inside one of its source directories.
    #[error("target '{target}' inside source directory '{source_dir}'")]
    NestedTarget { target: PathBuf, source_dir: PathBuf },
}

impl FsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FsError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<FsError> for BuildError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::Io { path, source } => BuildError::Io { path, source },
            other => BuildError::other(other),
        }
    }
}
