//! # attain-core
//!
//! The dependency engine of attain. A project is described as a DAG of
//! goals connected by actions; the engine drives that graph through three
//! coordinated traversals: build (bring all leaf goals up to date),
//! change propagation (re-build everything downstream of a changed goal),
//! and clean (remove removable artefacts).
//!
//! ## Key components
//!
//! - [`Project`] — owning container of the goal/action arena, build-id
//!   allocator and build lock
//! - [`Goal`] / [`Action`] — handles into the arena; a goal is keyed by an
//!   [`Artefact`], an action binds an [`Operation`]
//! - [`UpdateMode`] — per-goal policy deciding which in-edge actions must
//!   run, and in what order
//! - [`Builder`] — premises-first DAG walker starting from the leaf goals
//! - [`Changer`] — inverse walker propagating updates downstream
//! - [`clean`] — removes removable artefacts of produced goals
//! - [`Trace`] / [`Tracer`] — scoped run-time context and the structured
//!   event sink it reports to
//! - [`Env`] — hierarchical environment with tag overrides, deletions and
//!   shared stdio streams
//! - [`PrefixWriter`] — line-oriented decorator tagging sub-process output

pub mod action;
pub mod artefact;
pub mod builder;
pub mod changer;
pub mod cleaner;
pub mod env;
pub mod error;
pub mod goal;
pub mod prefix;
pub mod project;
pub mod trace;
pub mod update;

mod updater;
mod util;

pub use action::{Action, ActionId, FnOp, Operation};
pub use artefact::{Abstract, Artefact, ArtefactKey, RemovableArtefact};
pub use builder::Builder;
pub use changer::Changer;
pub use cleaner::clean;
pub use env::{Env, SharedReader, SharedWriter};
pub use error::BuildError;
pub use goal::{Goal, GoalId};
pub use prefix::PrefixWriter;
pub use project::{BuildLock, Project};
pub use trace::{CancelToken, NopTracer, Trace, Tracer};
pub use update::{UpdateActions, UpdateMode};

/// Monotonic per-project build identifier. Zero is reserved for "no build".
pub type BuildId = u64;
