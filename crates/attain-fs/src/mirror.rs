// mirror.rs — Destination-side image of an origin directory.

use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use attain_core::{Artefact, ArtefactKey, BuildError, Project, RemovableArtefact};
use sha2::{Digest, Sha256};

use crate::dir::Dir;
use crate::error::FsError;
use crate::filter::Decision;

/// Pairs an origin directory with a destination directory: for every
/// matching origin entry the mirror reports the corresponding destination
/// path, optionally translating file extensions. Used as the result of
/// conversion actions, its state is the newest mirrored destination entry.
#[derive(Clone)]
pub struct Mirror {
    origin: Dir,
    strip: Option<PathBuf>,
    dest: Dir,
    ext_map: HashMap<String, String>,
}

impl Mirror {
    pub fn new(origin: impl Into<Dir>, dest: impl Into<Dir>) -> Self {
        Mirror {
            origin: origin.into(),
            strip: None,
            dest: dest.into(),
            ext_map: HashMap::new(),
        }
    }

    /// Prefix stripped from origin paths before re-rooting them below the
    /// destination; defaults to the origin directory itself.
    pub fn with_strip(mut self, strip: impl Into<PathBuf>) -> Self {
        self.strip = Some(strip.into());
        self
    }

    /// Maps origin file extensions to destination extensions, e.g.
    /// `md → html`.
    pub fn with_ext(mut self, from: &str, to: &str) -> Self {
        self.ext_map.insert(
            from.trim_start_matches('.').to_string(),
            to.trim_start_matches('.').to_string(),
        );
        self
    }

    pub fn dest(&self) -> &Dir {
        &self.dest
    }

    /// The mirrored destination paths, project-relative.
    pub fn list(&self, in_prj: &Project) -> Result<Vec<PathBuf>, BuildError> {
        let mut mapped = Vec::new();
        self.ls(in_prj, &mut |dest| {
            mapped.push(dest.to_path_buf());
            Ok(())
        })?;
        Ok(mapped)
    }

    fn map_ext(&self, path: &Path) -> PathBuf {
        let Some(ext) = path.extension().map(|e| e.to_string_lossy().into_owned()) else {
            return path.to_path_buf();
        };
        match self.ext_map.get(&ext) {
            Some(to) => path.with_extension(to),
            None => path.to_path_buf(),
        }
    }

    fn ls(
        &self,
        in_prj: &Project,
        f: &mut dyn FnMut(&Path) -> Result<(), FsError>,
    ) -> Result<(), FsError> {
        let origin_root = in_prj
            .abs_path(self.origin.path())
            .map_err(build_to_fs)?;
        let strip = self.strip.as_deref().unwrap_or(self.origin.path());
        self.origin.ls(&origin_root, &mut |rel, meta| {
            let origin_path = self.origin.path().join(rel);
            let stripped = origin_path.strip_prefix(strip).unwrap_or(&origin_path);
            let dest_rel = self.map_ext(stripped);
            let dest_path = self.dest.path().join(&dest_rel);
            match self.dest.check(&dest_rel, meta)? {
                Decision::Keep => f(&dest_path),
                Decision::Skip | Decision::Prune => Ok(()),
            }
        })
    }
}

fn build_to_fs(err: BuildError) -> FsError {
    match err {
        BuildError::Io { path, source } => FsError::Io { path, source },
        other => FsError::Io {
            path: PathBuf::new(),
            source: std::io::Error::other(other),
        },
    }
}

impl Artefact for Mirror {
    fn key(&self) -> ArtefactKey {
        let mut hash = Sha256::new();
        hash.update("fs.Mirror\n");
        hash.update(self.origin.key().as_str());
        hash.update("\n");
        if let Some(strip) = &self.strip {
            hash.update(strip.to_string_lossy().as_bytes());
        }
        hash.update("\n");
        hash.update(self.dest.key().as_str());
        ArtefactKey::new(format!("{:x}", hash.finalize()))
    }

    fn kind(&self) -> &'static str {
        "mirror"
    }

    fn name(&self, in_prj: &Project) -> String {
        crate::file::slashed(&in_prj.rel_path(self.dest.path()))
    }

    fn state_at(&self, in_prj: &Project) -> Result<Option<SystemTime>, BuildError> {
        let mut newest: Option<SystemTime> = None;
        let walked = self.ls(in_prj, &mut |dest| {
            let abs = in_prj.abs_path(dest).map_err(build_to_fs)?;
            let meta = fs::metadata(&abs).map_err(|e| FsError::io(abs, e))?;
            let modified = meta.modified().map_err(|e| FsError::io(dest, e))?;
            if newest.map_or(true, |cur| modified > cur) {
                newest = Some(modified);
            }
            Ok(())
        });
        match walked {
            Ok(()) => Ok(newest),
            Err(FsError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn as_removable(&self) -> Option<&dyn RemovableArtefact> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RemovableArtefact for Mirror {
    fn exists(&self, in_prj: &Project) -> Result<bool, BuildError> {
        Ok(self.state_at(in_prj)?.is_some())
    }

    fn remove(&self, in_prj: &Project) -> Result<(), BuildError> {
        self.ls(in_prj, &mut |dest| {
            let abs = in_prj.abs_path(dest).map_err(build_to_fs)?;
            match fs::remove_file(&abs) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(FsError::io(abs, err)),
            }
        })?;
        Ok(())
    }
}
