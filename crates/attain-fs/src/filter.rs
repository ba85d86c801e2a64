// filter.rs — Composable predicates over directory entries.
//
// Filters decide per entry whether it belongs to a directory artefact.
// Every filter also folds its identity into the owning artefact's key
// digest, so two listings of the same directory with different filters are
// distinct goals.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::FsError;

/// Verdict of a filter for one entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The entry belongs to the artefact.
    Keep,
    /// The entry does not belong to the artefact.
    Skip,
    /// The entry does not belong to the artefact, and a tree walk must not
    /// descend into it.
    Prune,
}

impl Decision {
    pub fn keeps(self) -> bool {
        self == Decision::Keep
    }
}

/// Predicate over one directory entry, given its walk-relative path and
/// metadata.
pub trait Filter: Send + Sync + 'static {
    fn check(&self, path: &Path, meta: &Metadata) -> Result<Decision, FsError>;

    /// Folds the filter's identity into an artefact key digest.
    fn write_key(&self, hash: &mut Sha256);
}

pub(crate) fn check_opt(
    filter: &Option<Arc<dyn Filter>>,
    path: &Path,
    meta: &Metadata,
) -> Result<Decision, FsError> {
    match filter {
        Some(f) => f.check(path, meta),
        None => Ok(Decision::Keep),
    }
}

pub(crate) fn write_key_opt(filter: &Option<Arc<dyn Filter>>, hash: &mut Sha256) {
    if let Some(f) = filter {
        f.write_key(hash);
    }
}

/// Keeps directories (`IsDir(true)`) or non-directories (`IsDir(false)`).
#[derive(Clone, Copy, Debug)]
pub struct IsDir(pub bool);

impl Filter for IsDir {
    fn check(&self, _path: &Path, meta: &Metadata) -> Result<Decision, FsError> {
        Ok(if meta.is_dir() == self.0 {
            Decision::Keep
        } else {
            Decision::Skip
        })
    }

    fn write_key(&self, hash: &mut Sha256) {
        hash.update(format!("fs.IsDir {}\n", self.0));
    }
}

/// Keeps entries whose file name matches a glob pattern.
#[derive(Clone, Debug)]
pub struct NameMatch(glob::Pattern);

impl NameMatch {
    pub fn new(pattern: &str) -> Result<Self, FsError> {
        Ok(NameMatch(glob::Pattern::new(pattern)?))
    }
}

impl Filter for NameMatch {
    fn check(&self, path: &Path, _meta: &Metadata) -> Result<Decision, FsError> {
        let name = path.file_name().map(|n| n.to_string_lossy());
        Ok(match name {
            Some(name) if self.0.matches(&name) => Decision::Keep,
            _ => Decision::Skip,
        })
    }

    fn write_key(&self, hash: &mut Sha256) {
        hash.update(format!("fs.NameMatch {}\n", self.0.as_str()));
    }
}

/// Keeps entries with one of the given file extensions.
#[derive(Clone, Debug)]
pub struct Exts(HashSet<String>);

impl Exts {
    pub fn new<S: AsRef<str>>(exts: impl IntoIterator<Item = S>) -> Self {
        Exts(
            exts.into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_string())
                .collect(),
        )
    }
}

impl Filter for Exts {
    fn check(&self, path: &Path, _meta: &Metadata) -> Result<Decision, FsError> {
        let ext = path.extension().map(|e| e.to_string_lossy());
        Ok(match ext {
            Some(ext) if self.0.contains(ext.as_ref()) => Decision::Keep,
            _ => Decision::Skip,
        })
    }

    fn write_key(&self, hash: &mut Sha256) {
        let mut exts: Vec<&String> = self.0.iter().collect();
        exts.sort();
        hash.update("fs.Exts\n");
        for ext in exts {
            hash.update(format!("{ext}\n"));
        }
    }
}

/// Keeps entries whose unix mode matches the masks: any bit of `any` and
/// all bits of `all`. On non-unix platforms everything matches.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModeMask {
    pub any: u32,
    pub all: u32,
}

impl Filter for ModeMask {
    #[cfg(unix)]
    fn check(&self, _path: &Path, meta: &Metadata) -> Result<Decision, FsError> {
        use std::os::unix::fs::MetadataExt;
        let mode = meta.mode();
        let mut ok = true;
        if self.any != 0 {
            ok = ok && mode & self.any != 0;
        }
        if self.all != 0 {
            ok = ok && mode & self.all == self.all;
        }
        Ok(if ok { Decision::Keep } else { Decision::Skip })
    }

    #[cfg(not(unix))]
    fn check(&self, _path: &Path, _meta: &Metadata) -> Result<Decision, FsError> {
        Ok(Decision::Keep)
    }

    fn write_key(&self, hash: &mut Sha256) {
        hash.update(format!("fs.ModeMask {} {}\n", self.any, self.all));
    }
}

/// Keeps entries with no more than the given number of path components
/// below the walk root.
#[derive(Clone, Copy, Debug)]
pub struct MaxDepth(pub usize);

impl Filter for MaxDepth {
    fn check(&self, path: &Path, _meta: &Metadata) -> Result<Decision, FsError> {
        Ok(if path.components().count() <= self.0 {
            Decision::Keep
        } else {
            Decision::Skip
        })
    }

    fn write_key(&self, hash: &mut Sha256) {
        hash.update(format!("fs.MaxDepth {}\n", self.0));
    }
}

/// Prunes directories with the given walk-relative paths.
#[derive(Clone, Debug)]
pub struct SkipPaths(HashSet<PathBuf>);

impl SkipPaths {
    pub fn new<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
        SkipPaths(paths.into_iter().map(Into::into).collect())
    }
}

impl Filter for SkipPaths {
    fn check(&self, path: &Path, meta: &Metadata) -> Result<Decision, FsError> {
        if !meta.is_dir() {
            return Ok(Decision::Keep);
        }
        Ok(if self.0.contains(path) {
            Decision::Prune
        } else {
            Decision::Keep
        })
    }

    fn write_key(&self, hash: &mut Sha256) {
        let mut paths: Vec<String> = self.0.iter().map(|p| p.display().to_string()).collect();
        paths.sort();
        hash.update("fs.SkipPaths\n");
        for p in paths {
            hash.update(format!("{p}\n"));
        }
    }
}

/// Prunes directories with the given names, wherever they appear.
#[derive(Clone, Debug)]
pub struct SkipNames(HashSet<OsString>);

impl SkipNames {
    pub fn new<S: Into<OsString>>(names: impl IntoIterator<Item = S>) -> Self {
        SkipNames(names.into_iter().map(Into::into).collect())
    }
}

impl Filter for SkipNames {
    fn check(&self, path: &Path, meta: &Metadata) -> Result<Decision, FsError> {
        if !meta.is_dir() {
            return Ok(Decision::Keep);
        }
        Ok(match path.file_name() {
            Some(name) if self.0.contains(name) => Decision::Prune,
            _ => Decision::Keep,
        })
    }

    fn write_key(&self, hash: &mut Sha256) {
        let mut names: Vec<String> = self
            .0
            .iter()
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        names.sort();
        hash.update("fs.SkipNames\n");
        for n in names {
            hash.update(format!("{n}\n"));
        }
    }
}

/// Inverts keep and skip; prune stays prune.
pub struct Not(pub Arc<dyn Filter>);

impl Filter for Not {
    fn check(&self, path: &Path, meta: &Metadata) -> Result<Decision, FsError> {
        Ok(match self.0.check(path, meta)? {
            Decision::Keep => Decision::Skip,
            Decision::Skip => Decision::Keep,
            Decision::Prune => Decision::Prune,
        })
    }

    fn write_key(&self, hash: &mut Sha256) {
        hash.update("fs.Not\n");
        self.0.write_key(hash);
    }
}

/// Keeps an entry only when every inner filter keeps it. The first skip or
/// prune wins.
pub struct AllOf(pub Vec<Arc<dyn Filter>>);

impl Filter for AllOf {
    fn check(&self, path: &Path, meta: &Metadata) -> Result<Decision, FsError> {
        for f in &self.0 {
            match f.check(path, meta)? {
                Decision::Keep => {}
                other => return Ok(other),
            }
        }
        Ok(Decision::Keep)
    }

    fn write_key(&self, hash: &mut Sha256) {
        hash.update("fs.AllOf\n");
        for f in &self.0 {
            f.write_key(hash);
        }
    }
}

/// Keeps an entry when any inner filter keeps it. Skips only when all
/// inner filters skip; prunes when all skip and at least one pruned.
pub struct AnyOf(pub Vec<Arc<dyn Filter>>);

impl Filter for AnyOf {
    fn check(&self, path: &Path, meta: &Metadata) -> Result<Decision, FsError> {
        let mut pruned = false;
        for f in &self.0 {
            match f.check(path, meta)? {
                Decision::Keep => return Ok(Decision::Keep),
                Decision::Skip => {}
                Decision::Prune => pruned = true,
            }
        }
        Ok(if pruned {
            Decision::Prune
        } else {
            Decision::Skip
        })
    }

    fn write_key(&self, hash: &mut Sha256) {
        hash.update("fs.AnyOf\n");
        for f in &self.0 {
            f.write_key(hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn meta_of(create_dir: bool) -> (tempfile::TempDir, Metadata) {
        let dir = tempdir().unwrap();
        let p = dir.path().join("entry");
        if create_dir {
            fs::create_dir(&p).unwrap();
        } else {
            fs::write(&p, b"x").unwrap();
        }
        let meta = fs::metadata(&p).unwrap();
        (dir, meta)
    }

    #[test]
    fn name_match_globs_the_file_name() {
        let (_d, meta) = meta_of(false);
        let f = NameMatch::new("*.md").unwrap();
        assert!(f.check(Path::new("doc/x.md"), &meta).unwrap().keeps());
        assert!(!f.check(Path::new("doc/x.txt"), &meta).unwrap().keeps());
        assert!(NameMatch::new("[bad").is_err());
    }

    #[test]
    fn exts_normalize_leading_dots() {
        let (_d, meta) = meta_of(false);
        let f = Exts::new([".md", "puml"]);
        assert!(f.check(Path::new("a.md"), &meta).unwrap().keeps());
        assert!(f.check(Path::new("b.puml"), &meta).unwrap().keeps());
        assert!(!f.check(Path::new("c.txt"), &meta).unwrap().keeps());
    }

    #[test]
    fn max_depth_counts_components() {
        let (_d, meta) = meta_of(false);
        let f = MaxDepth(1);
        assert!(f.check(Path::new("top.md"), &meta).unwrap().keeps());
        assert!(!f.check(Path::new("sub/deep.md"), &meta).unwrap().keeps());
    }

    #[test]
    fn skip_names_prunes_directories_only() {
        let (_d, dir_meta) = meta_of(true);
        let (_d2, file_meta) = meta_of(false);
        let f = SkipNames::new(["target"]);
        assert_eq!(
            f.check(Path::new("x/target"), &dir_meta).unwrap(),
            Decision::Prune
        );
        assert_eq!(
            f.check(Path::new("x/target"), &file_meta).unwrap(),
            Decision::Keep
        );
    }

    #[test]
    fn combinators_compose() {
        let (_d, meta) = meta_of(false);
        let all = AllOf(vec![
            Arc::new(NameMatch::new("*.md").unwrap()),
            Arc::new(MaxDepth(1)),
        ]);
        assert!(all.check(Path::new("a.md"), &meta).unwrap().keeps());
        assert!(!all.check(Path::new("sub/a.md"), &meta).unwrap().keeps());

        let not = Not(Arc::new(NameMatch::new("*.md").unwrap()));
        assert!(!not.check(Path::new("a.md"), &meta).unwrap().keeps());
        assert!(not.check(Path::new("a.txt"), &meta).unwrap().keeps());

        let any = AnyOf(vec![
            Arc::new(NameMatch::new("*.md").unwrap()),
            Arc::new(NameMatch::new("*.txt").unwrap()),
        ]);
        assert!(any.check(Path::new("a.txt"), &meta).unwrap().keeps());
        assert!(!any.check(Path::new("a.rs"), &meta).unwrap().keeps());
    }

    #[test]
    fn distinct_filters_produce_distinct_keys() {
        let mut h1 = Sha256::new();
        NameMatch::new("*.md").unwrap().write_key(&mut h1);
        let mut h2 = Sha256::new();
        NameMatch::new("*.txt").unwrap().write_key(&mut h2);
        assert_ne!(h1.finalize(), h2.finalize());
    }
}
