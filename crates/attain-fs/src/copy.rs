// copy.rs — Operation copying filesystem premises into each result.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use attain_core::{
    Abstract, Action, Artefact, BuildError, Env, Goal, Operation, Project, Trace,
};
use sha2::{Digest, Sha256};

use crate::dir::{Dir, DirList, DirTree};
use crate::error::FsError;
use crate::file::File;
use crate::mirror::Mirror;

/// Copies every filesystem premise of an action into each of its results.
/// File results receive the concatenation of multiple file premises;
/// directory results receive the premise entries, flat for a list and with
/// their relative structure for a tree. A mirror result receives the
/// premises at its destination.
#[derive(Clone, Copy, Debug, Default)]
pub struct Copy {
    /// Create missing destination directories.
    pub make_dirs: bool,
}

enum Source {
    File(File),
    Dir(Dir),
}

impl Copy {
    fn sources(&self, action: &Action) -> Result<Vec<Source>, FsError> {
        let mut sources = Vec::new();
        for pre in action.premises() {
            let artefact = pre.artefact();
            let any = artefact.as_any();
            if any.is::<Abstract>() {
                continue;
            } else if let Some(file) = any.downcast_ref::<File>() {
                sources.push(Source::File(file.clone()));
            } else if let Some(list) = any.downcast_ref::<DirList>() {
                sources.push(Source::Dir(Dir::List(list.clone())));
            } else if let Some(tree) = any.downcast_ref::<DirTree>() {
                sources.push(Source::Dir(Dir::Tree(tree.clone())));
            } else {
                return Err(FsError::IllegalCopyArtefact {
                    role: "premise",
                    name: pre.name(),
                    kind: artefact.kind(),
                });
            }
        }
        Ok(sources)
    }

    fn to_file(
        &self,
        tr: &Trace,
        prj: &Arc<Project>,
        dest: &File,
        sources: &[Source],
    ) -> Result<(), FsError> {
        let dest_abs = prj.abs_path(dest.path()).map_err(io_of)?;
        if let Some(parent) = dest_abs.parent() {
            self.provide_dir(parent)?;
        }
        let mut file_sources = Vec::new();
        for src in sources {
            match src {
                Source::File(f) => file_sources.push(prj.abs_path(f.path()).map_err(io_of)?),
                Source::Dir(d) => {
                    return Err(FsError::IllegalCopyArtefact {
                        role: "premise",
                        name: d.path().display().to_string(),
                        kind: "directory",
                    })
                }
            }
        }
        if let [single] = file_sources.as_slice() {
            copy_file(tr, &dest_abs, single)?;
            return Ok(());
        }
        // multiple files concatenate into the destination
        let mut out = fs::File::create(&dest_abs).map_err(|e| FsError::io(&dest_abs, e))?;
        for src in &file_sources {
            if *src == dest_abs {
                tr.warn(&format!("FS copy: {} to itself, skipping", src.display()));
                continue;
            }
            tracing::debug!(src = %src.display(), dest = %dest_abs.display(), "FS copy: append");
            let mut input = fs::File::open(src).map_err(|e| FsError::io(src, e))?;
            std::io::copy(&mut input, &mut out).map_err(|e| FsError::io(src, e))?;
        }
        Ok(())
    }

    fn to_dir(
        &self,
        tr: &Trace,
        prj: &Arc<Project>,
        dest: &Dir,
        sources: &[Source],
    ) -> Result<(), FsError> {
        let dest_abs = prj.abs_path(dest.path()).map_err(io_of)?;
        self.provide_dir(&dest_abs)?;
        for src in sources {
            match src {
                Source::File(f) => {
                    let src_abs = prj.abs_path(f.path()).map_err(io_of)?;
                    let Some(name) = src_abs.file_name() else {
                        continue;
                    };
                    copy_file(tr, &dest_abs.join(name), &src_abs)?;
                }
                Source::Dir(d) => {
                    let src_abs = prj.abs_path(d.path()).map_err(io_of)?;
                    check_nesting(&dest_abs, d, &src_abs)?;
                    let flat = matches!(dest, Dir::List(_));
                    d.ls(&src_abs, &mut |rel, meta| {
                        let target = if flat {
                            match rel.file_name() {
                                Some(name) => dest_abs.join(name),
                                None => return Ok(()),
                            }
                        } else {
                            dest_abs.join(rel)
                        };
                        if meta.is_dir() {
                            tracing::debug!(dest = %target.display(), "FS copy: mkdir");
                            fs::create_dir_all(&target).map_err(|e| FsError::io(target, e))?;
                            Ok(())
                        } else {
                            copy_file(tr, &target, &src_abs.join(rel))
                        }
                    })?;
                }
            }
        }
        Ok(())
    }

    fn provide_dir(&self, path: &Path) -> Result<(), FsError> {
        if !self.make_dirs {
            return Ok(());
        }
        fs::create_dir_all(path).map_err(|e| FsError::io(path, e))
    }
}

// The destination must not lie inside a source directory that would copy
// it into itself.
fn check_nesting(dest_abs: &Path, src: &Dir, src_abs: &Path) -> Result<(), FsError> {
    if dest_abs.starts_with(src_abs) {
        return Err(FsError::NestedTarget {
            target: dest_abs.to_path_buf(),
            source_dir: src.path().to_path_buf(),
        });
    }
    Ok(())
}

fn copy_file(tr: &Trace, dest: &Path, src: &Path) -> Result<(), FsError> {
    if src == dest {
        tr.warn(&format!("FS copy: {} to itself, skipping", src.display()));
        return Ok(());
    }
    tracing::debug!(src = %src.display(), dest = %dest.display(), "FS copy");
    fs::copy(src, dest).map_err(|e| FsError::io(src, e))?;
    Ok(())
}

fn io_of(err: BuildError) -> FsError {
    match err {
        BuildError::Io { path, source } => FsError::Io { path, source },
        other => FsError::Io {
            path: PathBuf::new(),
            source: std::io::Error::other(other),
        },
    }
}

impl Operation for Copy {
    fn describe(&self, _action: Option<&Action>, _env: Option<&Env>) -> String {
        "FS copy".to_string()
    }

    fn perform(&self, tr: &Trace, action: &Action, _env: &Arc<Env>) -> Result<(), BuildError> {
        let sources = self.sources(action)?;
        let prj = action.project();
        for res in action.results() {
            let artefact = res.artefact();
            let any = artefact.as_any();
            if any.is::<Abstract>() {
                continue;
            } else if let Some(file) = any.downcast_ref::<File>() {
                self.to_file(tr, prj, file, &sources)?;
            } else if let Some(list) = any.downcast_ref::<DirList>() {
                self.to_dir(tr, prj, &Dir::List(list.clone()), &sources)?;
            } else if let Some(tree) = any.downcast_ref::<DirTree>() {
                self.to_dir(tr, prj, &Dir::Tree(tree.clone()), &sources)?;
            } else if let Some(mirror) = any.downcast_ref::<Mirror>() {
                self.to_dir(tr, prj, mirror.dest(), &sources)?;
            } else {
                return Err(illegal_result(&res, artefact.kind()));
            }
        }
        Ok(())
    }

    fn write_hash(
        &self,
        hash: &mut Sha256,
        action: &Action,
        _env: &Arc<Env>,
    ) -> Result<bool, BuildError> {
        for pre in action.premises() {
            hash.update(pre.name());
            hash.update("\n");
        }
        for res in action.results() {
            hash.update(res.name());
            hash.update("\n");
        }
        Ok(true)
    }
}

fn illegal_result(goal: &Goal, kind: &'static str) -> BuildError {
    FsError::IllegalCopyArtefact {
        role: "result",
        name: goal.name(),
        kind,
    }
    .into()
}
