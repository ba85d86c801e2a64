// error.rs — Error types for the build engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::BuildId;

/// Errors raised while defining or driving a project graph.
#[derive(Debug, Error)]
pub enum BuildError {
    /// An action was created without any result goal.
    #[error("creating action '{op}' without result")]
    ActionWithoutResult { op: String },

    /// A premise or result goal belongs to a different project.
    #[error("goal '{goal}' not in project '{project}'")]
    ForeignGoal { goal: String, project: String },

    /// A project artefact was adopted while it already had another parent.
    #[error("adding sub-project '{sub}' of '{parent}' to project '{project}'")]
    SubProjectOwned {
        sub: String,
        parent: String,
        project: String,
    },

    /// Co-result goals disagree about the number of producing actions.
    #[error("different number of actions for goal '{goal}' and involved goal '{involved}'")]
    ActionCountConflict { goal: String, involved: String },

    /// Co-result goals disagree about action ordering.
    #[error("update conflict of unordered goal '{unordered}' with ordered goal '{ordered}'")]
    OrderingConflict { ordered: String, unordered: String },

    /// Co-result goals disagree about the producing action set.
    #[error("different actions for goal '{goal}' and involved goal '{involved}'")]
    ActionSetConflict { goal: String, involved: String },

    /// A goal name did not resolve within the project.
    #[error("no goal named '{name}' in project '{project}'")]
    UnknownGoal { name: String, project: String },

    /// Update mode One saw more than one changed action.
    #[error("{count} change actions for update mode One in goal '{goal}'")]
    OneModeChanges { count: usize, goal: String },

    /// Update mode Any found an already-run action outside the scheduled set.
    #[error("goal '{goal}' with update mode Any involved by inconsistent action")]
    AnyModeInconsistent { goal: String },

    /// Update mode Any found more than one already-run action.
    #[error("goal '{goal}' with update mode Any already ran more than one action")]
    AnyModeMultiple { goal: String },

    /// Update mode One found an already-run action that was not scheduled.
    #[error("goal '{goal}' with update mode One involved by inconsistent action")]
    OneModeInconsistent { goal: String },

    /// An ordered in-edge action was observed to have run out of order.
    #[error("action '{action}' potentially ran out of order")]
    OutOfOrder { action: String },

    /// An action was already run by a younger build; the graph is being
    /// driven by a parallel or re-entrant builder.
    #[error("action '{action}' already run by younger build {build}")]
    YoungerBuild { action: String, build: BuildId },

    /// A build-project action has a result that is neither a project nor an
    /// abstract marker.
    #[error("illegal project build target '{name}' of kind {kind}")]
    IllegalBuildTarget { kind: String, name: String },

    /// Environment tags that cannot be rendered as process environment
    /// entries.
    #[error("illegal exec env keys: {}", keys.join(", "))]
    InvalidEnvKeys { keys: Vec<String> },

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The current traversal was cancelled.
    #[error("build cancelled")]
    Cancelled,

    /// Failure reported by an operation or an external artefact.
    #[error("{source}")]
    Other {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn other(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        BuildError::Other {
            source: Box::new(source),
        }
    }
}
