// env.rs — Hierarchical build environment: tag overrides, deletions and
// shared stdio streams.
//
// Environments form a chain of scopes. Tag lookup walks from the nearest
// scope outward; a deletion shadows parent values. The flattened process
// environment is memoized per scope and invalidated by a version counter
// spanning the whole chain.

use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::BuildError;
use crate::util;

/// Cloneable writer handle shared between environment scopes. Writes are
/// serialized through an internal mutex.
#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<Box<dyn Write + Send>>>);

impl SharedWriter {
    pub fn new(w: impl Write + Send + 'static) -> Self {
        SharedWriter(Arc::new(Mutex::new(Box::new(w))))
    }

    pub fn stdout() -> Self {
        SharedWriter::new(io::stdout())
    }

    pub fn stderr() -> Self {
        SharedWriter::new(io::stderr())
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        util::lock(&self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        util::lock(&self.0).flush()
    }
}

/// Cloneable reader handle; the counterpart of [`SharedWriter`].
#[derive(Clone)]
pub struct SharedReader(Arc<Mutex<Box<dyn Read + Send>>>);

impl SharedReader {
    pub fn new(r: impl Read + Send + 'static) -> Self {
        SharedReader(Arc::new(Mutex::new(Box::new(r))))
    }

    pub fn stdin() -> Self {
        SharedReader::new(io::stdin())
    }
}

impl Read for SharedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        util::lock(&self.0).read(buf)
    }
}

struct Scope {
    tags: HashMap<String, String>,
    deleted: HashSet<String>,
    // flattened "K=V" snapshot with the chain version it was taken at;
    // Err carries the offending keys
    snapshot: Option<(u64, Result<Vec<String>, Vec<String>>)>,
}

/// One scope of the environment chain, carrying tag overrides, deletions
/// and the stdio streams operations read from and write to.
pub struct Env {
    parent: Option<Arc<Env>>,
    scope: Mutex<Scope>,
    version: AtomicU64,

    pub input: Option<SharedReader>,
    pub out: Option<SharedWriter>,
    pub err: Option<SharedWriter>,
}

impl Env {
    /// An empty environment without streams or tags.
    pub fn new() -> Env {
        Env {
            parent: None,
            scope: Mutex::new(Scope {
                tags: HashMap::new(),
                deleted: HashSet::new(),
                snapshot: None,
            }),
            version: AtomicU64::new(0),
            input: None,
            out: None,
            err: None,
        }
    }

    /// The default environment: process stdio plus every tag of the host
    /// process environment.
    pub fn host() -> Env {
        let mut env = Env::new();
        env.input = Some(SharedReader::stdin());
        env.out = Some(SharedWriter::stdout());
        env.err = Some(SharedWriter::stderr());
        {
            let mut scope = util::lock(&env.scope);
            for (key, val) in std::env::vars_os() {
                scope.tags.insert(
                    key.to_string_lossy().into_owned(),
                    val.to_string_lossy().into_owned(),
                );
            }
        }
        env
    }

    /// A child scope sharing this environment's streams. Tags set on the
    /// child shadow this environment without changing it.
    pub fn sub(self: &Arc<Self>) -> Env {
        Env {
            parent: Some(self.clone()),
            scope: Mutex::new(Scope {
                tags: HashMap::new(),
                deleted: HashSet::new(),
                snapshot: None,
            }),
            version: AtomicU64::new(0),
            input: self.input.clone(),
            out: self.out.clone(),
            err: self.err.clone(),
        }
    }

    /// A flat copy: the merged tags of the whole chain in a single scope.
    pub fn clone_flat(&self) -> Env {
        let mut env = Env::new();
        env.input = self.input.clone();
        env.out = self.out.clone();
        env.err = self.err.clone();
        util::lock(&env.scope).tags = self.merged_tags();
        env
    }

    /// Looks `key` up from the nearest scope outward; deletions shadow
    /// parent values.
    pub fn tag(&self, key: &str) -> Option<String> {
        let mut env = Some(self);
        while let Some(e) = env {
            let scope = util::lock(&e.scope);
            if let Some(v) = scope.tags.get(key) {
                return Some(v.clone());
            }
            if scope.deleted.contains(key) {
                return None;
            }
            drop(scope);
            env = e.parent.as_deref();
        }
        None
    }

    pub fn set_tag(&self, key: impl Into<String>, val: impl Into<String>) {
        let key = key.into();
        let mut scope = util::lock(&self.scope);
        scope.deleted.remove(&key);
        scope.tags.insert(key, val.into());
        scope.snapshot = None;
        drop(scope);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Sets tags from `KEY=VALUE` entries; an entry without `=` sets the
    /// empty value.
    pub fn set_tags<S: AsRef<str>>(&self, entries: impl IntoIterator<Item = S>) {
        for entry in entries {
            let entry = entry.as_ref();
            match entry.split_once('=') {
                Some((k, v)) => self.set_tag(k, v),
                None => self.set_tag(entry, ""),
            }
        }
    }

    /// Deletes `key` in this scope, shadowing any parent value.
    pub fn del_tag(&self, key: &str) {
        let mut scope = util::lock(&self.scope);
        scope.tags.remove(key);
        if self.parent.is_some() {
            scope.deleted.insert(key.to_string());
        }
        scope.snapshot = None;
        drop(scope);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// The flattened `KEY=VALUE` snapshot for process execution. Fails when
    /// any visible key is empty or contains `=`.
    pub fn exec_env(&self) -> Result<Vec<String>, BuildError> {
        let version = self.chain_version();
        let mut scope = util::lock(&self.scope);
        if let Some((v, cached)) = &scope.snapshot {
            if *v == version {
                return match cached {
                    Ok(entries) => Ok(entries.clone()),
                    Err(keys) => Err(BuildError::InvalidEnvKeys { keys: keys.clone() }),
                };
            }
        }
        drop(scope);
        let merged = self.merged_tags();
        let mut entries = Vec::with_capacity(merged.len());
        let mut bad_keys = Vec::new();
        for (k, v) in merged {
            if k.is_empty() {
                bad_keys.push("\"\"".to_string());
            } else if k.contains('=') {
                bad_keys.push(k);
            } else {
                entries.push(format!("{k}={v}"));
            }
        }
        entries.sort();
        bad_keys.sort();
        let result = if bad_keys.is_empty() {
            Ok(entries)
        } else {
            Err(bad_keys)
        };
        let mut scope = util::lock(&self.scope);
        scope.snapshot = Some((version, result.clone()));
        match result {
            Ok(entries) => Ok(entries),
            Err(keys) => Err(BuildError::InvalidEnvKeys { keys }),
        }
    }

    /// Like [`Env::exec_env`], but silently drops entries that cannot be
    /// rendered as process environment entries.
    pub fn exec_env_lossy(&self) -> Vec<String> {
        let mut entries: Vec<String> = self
            .merged_tags()
            .into_iter()
            .filter(|(k, _)| !k.is_empty() && !k.contains('='))
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        entries.sort();
        entries
    }

    /// The effective tag map of the whole chain.
    pub fn merged_tags(&self) -> HashMap<String, String> {
        let mut merged = match &self.parent {
            Some(parent) => parent.merged_tags(),
            None => HashMap::new(),
        };
        let scope = util::lock(&self.scope);
        for key in &scope.deleted {
            merged.remove(key);
        }
        for (k, v) in &scope.tags {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    fn chain_version(&self) -> u64 {
        let own = self.version.load(Ordering::SeqCst);
        match &self.parent {
            Some(parent) => own + parent.chain_version(),
            None => own,
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Env::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_tags_entry_forms() {
        let e = Env::new();
        e.set_tags([""]);
        assert_eq!(e.tag(""), Some(String::new()));
        e.set_tags(["foo"]);
        assert_eq!(e.tag("foo"), Some(String::new()));
        e.set_tags(["foo=bar"]);
        assert_eq!(e.tag("foo"), Some("bar".to_string()));
        e.set_tags(["=bar"]);
        assert_eq!(e.tag(""), Some("bar".to_string()));
    }

    #[test]
    fn deletion_shadows_parent_value() {
        let parent = Arc::new(Env::new());
        parent.set_tag("KEY", "outer");
        let child = parent.sub();
        assert_eq!(child.tag("KEY"), Some("outer".to_string()));
        child.del_tag("KEY");
        assert_eq!(child.tag("KEY"), None);
        assert_eq!(parent.tag("KEY"), Some("outer".to_string()));
        child.set_tag("KEY", "inner");
        assert_eq!(child.tag("KEY"), Some("inner".to_string()));
    }

    #[test]
    fn exec_env_rejects_unrepresentable_keys() {
        let e = Env::new();
        e.set_tag("GOOD", "1");
        e.set_tag("BAD=KEY", "2");
        match e.exec_env() {
            Err(BuildError::InvalidEnvKeys { keys }) => {
                assert_eq!(keys, vec!["BAD=KEY".to_string()])
            }
            other => panic!("expected InvalidEnvKeys, got {other:?}"),
        }
        assert_eq!(e.exec_env_lossy(), vec!["GOOD=1".to_string()]);
    }

    #[test]
    fn exec_env_memo_sees_parent_mutations() {
        let parent = Arc::new(Env::new());
        parent.set_tag("A", "1");
        let child = parent.sub();
        assert_eq!(child.exec_env().unwrap(), vec!["A=1".to_string()]);
        parent.set_tag("B", "2");
        assert_eq!(
            child.exec_env().unwrap(),
            vec!["A=1".to_string(), "B=2".to_string()]
        );
    }
}
