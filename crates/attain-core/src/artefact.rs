// artefact.rs — The artefact contract and the Abstract marker artefact.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::BuildError;
use crate::project::Project;

/// Identity used to deduplicate goals within a project. For path-valued
/// artefacts this is the slash-normalized path, for abstract artefacts the
/// name; other kinds may use any stable, comparable string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtefactKey(String);

impl ArtefactKey {
    pub fn new(key: impl Into<String>) -> Self {
        ArtefactKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtefactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An Artefact is the tangible outcome of a [`Goal`](crate::Goal) being
/// reached. A special case is the [`Abstract`] artefact, which only provides
/// a name.
pub trait Artefact: Send + Sync + 'static {
    /// Identity that must be unique within a project.
    fn key(&self) -> ArtefactKey;

    /// Short tag naming the artefact kind, used in displays and diagrams.
    fn kind(&self) -> &'static str;

    /// The name of the artefact; unique within `in_prj`.
    fn name(&self, in_prj: &Project) -> String;

    /// The time at which the artefact reached its current state, or `None`
    /// when that cannot be observed.
    fn state_at(&self, in_prj: &Project) -> Result<Option<SystemTime>, BuildError>;

    /// Removal capability, consulted by the cleaner.
    fn as_removable(&self) -> Option<&dyn RemovableArtefact> {
        None
    }

    /// The project behind a project-valued artefact.
    fn as_project(&self) -> Option<&Arc<Project>> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Artefacts that can report existence and be removed by the cleaner.
pub trait RemovableArtefact: Artefact {
    fn exists(&self, in_prj: &Project) -> Result<bool, BuildError>;
    fn remove(&self, in_prj: &Project) -> Result<(), BuildError>;
}

/// A pure marker artefact: a name for goals without tangible results, used
/// to label groups or phases.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Abstract(String);

impl Abstract {
    pub fn new(name: impl Into<String>) -> Self {
        Abstract(name.into())
    }
}

impl fmt::Display for Abstract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Artefact for Abstract {
    fn key(&self) -> ArtefactKey {
        ArtefactKey::new(self.0.clone())
    }

    fn kind(&self) -> &'static str {
        "abstract"
    }

    fn name(&self, _in_prj: &Project) -> String {
        self.0.clone()
    }

    /// An abstract goal produced by any real action has no observable state.
    /// One reached purely by implicit actions inherits the newest state of
    /// all their premises, so stable inputs never force a rebuild.
    fn state_at(&self, in_prj: &Project) -> Result<Option<SystemTime>, BuildError> {
        in_prj.abstract_state(&self.key())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
