// dir.rs — Directory-shaped artefacts: filtered listings and trees.
//
// The artefact key digests the directory path together with the attached
// filter, so the same directory listed with two different filters forms
// two distinct goals.

use std::any::Any;
use std::fs::{self, Metadata};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use attain_core::{Artefact, ArtefactKey, BuildError, Project, RemovableArtefact};
use sha2::{Digest, Sha256};

use crate::error::FsError;
use crate::file::slashed;
use crate::filter::{check_opt, write_key_opt, AllOf, Decision, Filter, IsDir, MaxDepth, NameMatch};

type EntryFn<'a> = &'a mut dyn FnMut(&Path, &Metadata) -> Result<(), FsError>;

/// The immediate entries of a directory that pass the attached filter.
/// Stated by the newest matching entry.
#[derive(Clone)]
pub struct DirList {
    dir: PathBuf,
    filter: Option<Arc<dyn Filter>>,
}

impl DirList {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirList {
            dir: dir.into(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Filter) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// The matching entries as project-relative paths.
    pub fn list(&self, in_prj: &Project) -> Result<Vec<PathBuf>, BuildError> {
        let root = in_prj.abs_path(&self.dir)?;
        let mut entries = Vec::new();
        self.ls(&root, &mut |rel, _meta| {
            entries.push(self.dir.join(rel));
            Ok(())
        })?;
        Ok(entries)
    }

    /// Walks the matching entries; `rel` is the entry name.
    pub(crate) fn ls(&self, root: &Path, f: EntryFn) -> Result<(), FsError> {
        let dir = fs::read_dir(root).map_err(|e| FsError::io(root, e))?;
        let mut entries: Vec<_> = dir
            .collect::<Result<_, _>>()
            .map_err(|e| FsError::io(root, e))?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let meta = entry.metadata().map_err(|e| FsError::io(entry.path(), e))?;
            let rel = PathBuf::from(entry.file_name());
            if check_opt(&self.filter, &rel, &meta)?.keeps() {
                f(&rel, &meta)?;
            }
        }
        Ok(())
    }

    pub(crate) fn check(&self, rel: &Path, meta: &Metadata) -> Result<Decision, FsError> {
        check_opt(&self.filter, rel, meta)
    }
}

impl Artefact for DirList {
    fn key(&self) -> ArtefactKey {
        let mut hash = Sha256::new();
        hash.update("fs.DirList\n");
        hash.update(slashed(&self.dir));
        hash.update("\n");
        write_key_opt(&self.filter, &mut hash);
        ArtefactKey::new(format!("{:x}", hash.finalize()))
    }

    fn kind(&self) -> &'static str {
        "dir-list"
    }

    fn name(&self, in_prj: &Project) -> String {
        slashed(&in_prj.rel_path(&self.dir))
    }

    fn state_at(&self, in_prj: &Project) -> Result<Option<SystemTime>, BuildError> {
        let root = in_prj.abs_path(&self.dir)?;
        dir_state(&root, &mut |f| self.ls(&root, f))
    }

    fn as_removable(&self) -> Option<&dyn RemovableArtefact> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RemovableArtefact for DirList {
    fn exists(&self, in_prj: &Project) -> Result<bool, BuildError> {
        dir_exists(&in_prj.abs_path(&self.dir)?, &self.dir)
    }

    fn remove(&self, in_prj: &Project) -> Result<(), BuildError> {
        let root = in_prj.abs_path(&self.dir)?;
        let mut files = Vec::new();
        self.ls(&root, &mut |rel, meta| {
            if !meta.is_dir() {
                files.push(root.join(rel));
            }
            Ok(())
        })?;
        remove_files_then_dir(&files, &root)
    }
}

/// The whole tree below a directory, restricted by the attached filter.
/// Stated by the newest matching entry; prune filters cut whole subtrees
/// out of the walk.
#[derive(Clone)]
pub struct DirTree {
    dir: PathBuf,
    filter: Option<Arc<dyn Filter>>,
}

impl DirTree {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirTree {
            dir: dir.into(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Filter) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// The matching entries as project-relative paths.
    pub fn list(&self, in_prj: &Project) -> Result<Vec<PathBuf>, BuildError> {
        let root = in_prj.abs_path(&self.dir)?;
        let mut entries = Vec::new();
        self.ls(&root, &mut |rel, _meta| {
            entries.push(self.dir.join(rel));
            Ok(())
        })?;
        Ok(entries)
    }

    /// Walks the matching entries; `rel` is the path below the tree root.
    pub(crate) fn ls(&self, root: &Path, f: EntryFn) -> Result<(), FsError> {
        self.walk(root, Path::new(""), f)
    }

    fn walk(&self, abs: &Path, rel: &Path, f: EntryFn) -> Result<(), FsError> {
        let dir = fs::read_dir(abs).map_err(|e| FsError::io(abs, e))?;
        let mut entries: Vec<_> = dir
            .collect::<Result<_, _>>()
            .map_err(|e| FsError::io(abs, e))?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let meta = entry.metadata().map_err(|e| FsError::io(entry.path(), e))?;
            let entry_rel = rel.join(entry.file_name());
            match check_opt(&self.filter, &entry_rel, &meta)? {
                Decision::Keep => {
                    f(&entry_rel, &meta)?;
                    if meta.is_dir() {
                        self.walk(&entry.path(), &entry_rel, f)?;
                    }
                }
                Decision::Skip => {
                    if meta.is_dir() {
                        self.walk(&entry.path(), &entry_rel, f)?;
                    }
                }
                Decision::Prune => {}
            }
        }
        Ok(())
    }

    pub(crate) fn check(&self, rel: &Path, meta: &Metadata) -> Result<Decision, FsError> {
        check_opt(&self.filter, rel, meta)
    }
}

impl Artefact for DirTree {
    fn key(&self) -> ArtefactKey {
        let mut hash = Sha256::new();
        hash.update("fs.DirTree\n");
        hash.update(slashed(&self.dir));
        hash.update("\n");
        write_key_opt(&self.filter, &mut hash);
        ArtefactKey::new(format!("{:x}", hash.finalize()))
    }

    fn kind(&self) -> &'static str {
        "dir-tree"
    }

    fn name(&self, in_prj: &Project) -> String {
        slashed(&in_prj.rel_path(&self.dir))
    }

    fn state_at(&self, in_prj: &Project) -> Result<Option<SystemTime>, BuildError> {
        let root = in_prj.abs_path(&self.dir)?;
        dir_state(&root, &mut |f| self.ls(&root, f))
    }

    fn as_removable(&self) -> Option<&dyn RemovableArtefact> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RemovableArtefact for DirTree {
    fn exists(&self, in_prj: &Project) -> Result<bool, BuildError> {
        dir_exists(&in_prj.abs_path(&self.dir)?, &self.dir)
    }

    fn remove(&self, in_prj: &Project) -> Result<(), BuildError> {
        let root = in_prj.abs_path(&self.dir)?;
        let mut files = Vec::new();
        self.ls(&root, &mut |rel, meta| {
            if !meta.is_dir() {
                files.push(root.join(rel));
            }
            Ok(())
        })?;
        remove_files_then_dir(&files, &root)
    }
}

/// Either directory artefact shape, where both are acceptable.
#[derive(Clone)]
pub enum Dir {
    List(DirList),
    Tree(DirTree),
}

impl Dir {
    pub fn path(&self) -> &Path {
        match self {
            Dir::List(d) => d.path(),
            Dir::Tree(d) => d.path(),
        }
    }

    pub(crate) fn ls(&self, root: &Path, f: EntryFn) -> Result<(), FsError> {
        match self {
            Dir::List(d) => d.ls(root, f),
            Dir::Tree(d) => d.ls(root, f),
        }
    }

    pub(crate) fn check(&self, rel: &Path, meta: &Metadata) -> Result<Decision, FsError> {
        match self {
            Dir::List(d) => d.check(rel, meta),
            Dir::Tree(d) => d.check(rel, meta),
        }
    }

    pub fn key(&self) -> ArtefactKey {
        match self {
            Dir::List(d) => d.key(),
            Dir::Tree(d) => d.key(),
        }
    }
}

impl From<DirList> for Dir {
    fn from(d: DirList) -> Self {
        Dir::List(d)
    }
}

impl From<DirTree> for Dir {
    fn from(d: DirTree) -> Self {
        Dir::Tree(d)
    }
}

/// The files directly below `dir`, optionally restricted to a name pattern
/// and a maximum depth.
pub fn dir_files(
    dir: impl Into<PathBuf>,
    pattern: &str,
    max_depth: usize,
) -> Result<DirTree, FsError> {
    let mut filters: Vec<Arc<dyn Filter>> = vec![Arc::new(IsDir(false))];
    if !pattern.is_empty() {
        filters.push(Arc::new(NameMatch::new(pattern)?));
    }
    if max_depth > 0 {
        filters.push(Arc::new(MaxDepth(max_depth)));
    }
    Ok(DirTree::new(dir).with_filter(AllOf(filters)))
}

fn dir_state(
    root: &Path,
    ls: &mut dyn FnMut(EntryFn) -> Result<(), FsError>,
) -> Result<Option<SystemTime>, BuildError> {
    let mut newest: Option<SystemTime> = None;
    let walked = ls(&mut |_rel, meta| {
        let modified = meta.modified().map_err(|e| FsError::io(root, e))?;
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

fn dir_exists(root: &Path, shown: &Path) -> Result<bool, BuildError> {
    match fs::metadata(root) {
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(FsError::io(root, err).into()),
        Ok(meta) if !meta.is_dir() => Err(FsError::NotADirectory {
            path: shown.to_path_buf(),
        }
        .into()),
        Ok(_) => Ok(true),
    }
}

fn remove_files_then_dir(files: &[PathBuf], root: &Path) -> Result<(), BuildError> {
    for file in files {
        fs::remove_file(file).map_err(|e| FsError::io(file, e))?;
    }
    // drop the root only when the removals emptied it
    if fs::read_dir(root)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
    {
        fs::remove_dir(root).map_err(|e| FsError::io(root, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn seed(root: &Path) {
        fs::create_dir_all(root.join("doc/sub")).unwrap();
        fs::create_dir_all(root.join("doc/target")).unwrap();
        fs::write(root.join("doc/a.md"), b"a").unwrap();
        fs::write(root.join("doc/b.txt"), b"b").unwrap();
        fs::write(root.join("doc/sub/c.md"), b"c").unwrap();
        fs::write(root.join("doc/target/d.md"), b"d").unwrap();
    }

    #[test]
    fn dir_list_sees_only_direct_matches() {
        let tmp = tempdir().unwrap();
        seed(tmp.path());
        let prj = Project::new(tmp.path());
        let list = DirList::new("doc").with_filter(NameMatch::new("*.md").unwrap());
        assert_eq!(list.list(&prj).unwrap(), vec![PathBuf::from("doc/a.md")]);
    }

    #[test]
    fn dir_tree_walks_and_prunes() {
        let tmp = tempdir().unwrap();
        seed(tmp.path());
        let prj = Project::new(tmp.path());
        let tree = DirTree::new("doc").with_filter(AllOf(vec![
            Arc::new(crate::filter::SkipNames::new(["target"])),
            Arc::new(NameMatch::new("*.md").unwrap()),
        ]));
        assert_eq!(
            tree.list(&prj).unwrap(),
            vec![PathBuf::from("doc/a.md"), PathBuf::from("doc/sub/c.md")]
        );
    }

    #[test]
    fn state_is_the_newest_matching_entry() {
        let tmp = tempdir().unwrap();
        seed(tmp.path());
        let prj = Project::new(tmp.path());
        let tree = DirTree::new("doc").with_filter(NameMatch::new("*.md").unwrap());
        let state = tree.state_at(&prj).unwrap().unwrap();
        let newest = fs::metadata(tmp.path().join("doc/target/d.md"))
            .unwrap()
            .modified()
            .unwrap();
        assert!(state >= newest);

        let missing = DirTree::new("no-such-dir");
        assert_eq!(missing.state_at(&prj).unwrap(), None);
    }

    #[test]
    fn keys_differ_per_dir_and_filter() {
        let plain = DirList::new("doc");
        let filtered = DirList::new("doc").with_filter(NameMatch::new("*.md").unwrap());
        let elsewhere = DirList::new("img");
        assert_ne!(plain.key(), filtered.key());
        assert_ne!(plain.key(), elsewhere.key());
        let tree = DirTree::new("doc");
        assert_ne!(plain.key(), tree.key());
    }

    #[test]
    fn remove_deletes_matches_and_empty_root() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("out")).unwrap();
        fs::write(tmp.path().join("out/x.html"), b"x").unwrap();
        let prj = Project::new(tmp.path());
        let list = DirList::new("out");
        assert!(list.exists(&prj).unwrap());
        list.remove(&prj).unwrap();
        assert!(!tmp.path().join("out").exists());
        assert!(!list.exists(&prj).unwrap());
    }
}
