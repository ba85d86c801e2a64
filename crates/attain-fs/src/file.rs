// file.rs — Single-file artefact.

use std::any::Any;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use attain_core::{Artefact, ArtefactKey, BuildError, Project, RemovableArtefact};

use crate::error::FsError;

pub(crate) fn slashed(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// A file in the project tree, identified by its project-relative (or
/// absolute) path. Its state is the file's modification time; a missing
/// file has no state.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        File { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The same file with its extension replaced; an empty `ext` strips the
    /// extension.
    pub fn with_ext(&self, ext: &str) -> File {
        let mut path = self.path.clone();
        if ext.is_empty() {
            path.set_extension("");
        } else {
            path.set_extension(ext.trim_start_matches('.'));
        }
        File { path }
    }
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&slashed(&self.path))
    }
}

impl Artefact for File {
    fn key(&self) -> ArtefactKey {
        ArtefactKey::new(slashed(&self.path))
    }

    fn kind(&self) -> &'static str {
        "file"
    }

    fn name(&self, in_prj: &Project) -> String {
        slashed(&in_prj.rel_path(&self.path))
    }

    fn state_at(&self, in_prj: &Project) -> Result<Option<SystemTime>, BuildError> {
        let abs = in_prj.abs_path(&self.path)?;
        match fs::metadata(&abs) {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(FsError::io(abs, err).into()),
            Ok(meta) if meta.is_dir() => {
                Err(FsError::IsDirectory { path: self.path.clone() }.into())
            }
            Ok(meta) => {
                let modified = meta.modified().map_err(|e| FsError::io(&abs, e))?;
                Ok(Some(modified))
            }
        }
    }

    fn as_removable(&self) -> Option<&dyn RemovableArtefact> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RemovableArtefact for File {
    fn exists(&self, in_prj: &Project) -> Result<bool, BuildError> {
        let abs = in_prj.abs_path(&self.path)?;
        match fs::metadata(&abs) {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(FsError::io(abs, err).into()),
            Ok(meta) if meta.is_dir() => {
                Err(FsError::IsDirectory { path: self.path.clone() }.into())
            }
            Ok(_) => Ok(true),
        }
    }

    fn remove(&self, in_prj: &Project) -> Result<(), BuildError> {
        let abs = in_prj.abs_path(&self.path)?;
        fs::remove_file(&abs).map_err(|e| FsError::io(abs, e).into())
    }
}
