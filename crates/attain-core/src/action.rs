// action.rs — Actions connect premise goals to result goals.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sha2::Sha256;

use crate::env::Env;
use crate::error::BuildError;
use crate::goal::{Goal, GoalId};
use crate::project::Project;
use crate::trace::Trace;
use crate::BuildId;

/// Index of an action within its project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActionId(pub(crate) usize);

impl ActionId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A unit of work bound to an [`Action`]: an external command, a filesystem
/// copy, a toolchain step.
pub trait Operation: Send + Sync + 'static {
    /// One-line description of the operation; the hints are optional.
    fn describe(&self, action: Option<&Action>, env: Option<&Env>) -> String;

    /// Performs the operation.
    fn perform(&self, trace: &Trace, action: &Action, env: &Arc<Env>) -> Result<(), BuildError>;

    /// Contributes the operation's identity to a content hash. Returns
    /// whether the contribution is authoritative.
    fn write_hash(
        &self,
        _hash: &mut Sha256,
        _action: &Action,
        _env: &Arc<Env>,
    ) -> Result<bool, BuildError> {
        Ok(false)
    }
}

pub(crate) struct ActionNode {
    pub(crate) op: Option<Arc<dyn Operation>>,
    pub(crate) ignore_error: bool,
    pub(crate) premises: Vec<GoalId>,
    pub(crate) results: Vec<GoalId>,
    pub(crate) lock_owner: AtomicU64,
    pub(crate) last_build: AtomicU64,
}

impl ActionNode {
    pub(crate) fn new(
        op: Option<Arc<dyn Operation>>,
        premises: Vec<GoalId>,
        results: Vec<GoalId>,
    ) -> Self {
        ActionNode {
            op,
            ignore_error: false,
            premises,
            results,
            lock_owner: AtomicU64::new(0),
            last_build: AtomicU64::new(0),
        }
    }
}

/// An Action is something to do in a [`Project`] to achieve at least one
/// [`Goal`]. An action without an operation is "implicit": when all its
/// premises hold, all its results are implicitly given.
#[derive(Clone)]
pub struct Action {
    prj: Arc<Project>,
    id: ActionId,
}

impl Action {
    pub(crate) fn new(prj: Arc<Project>, id: ActionId) -> Self {
        Action { prj, id }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn project(&self) -> &Arc<Project> {
        &self.prj
    }

    pub fn operation(&self) -> Option<Arc<dyn Operation>> {
        self.prj.with_graph(|g| g.actions[self.id.index()].op.clone())
    }

    pub fn is_implicit(&self) -> bool {
        self.prj.with_graph(|g| g.actions[self.id.index()].op.is_none())
    }

    /// When set, a failing operation is reported as a warning and the
    /// action counts as successful.
    pub fn ignore_error(&self) -> bool {
        self.prj
            .with_graph(|g| g.actions[self.id.index()].ignore_error)
    }

    pub fn set_ignore_error(&self, ignore: bool) {
        self.prj
            .with_graph_mut(|g| g.actions[self.id.index()].ignore_error = ignore);
    }

    pub fn premises(&self) -> Vec<Goal> {
        let ids = self
            .prj
            .with_graph(|g| g.actions[self.id.index()].premises.clone());
        ids.into_iter()
            .map(|id| Goal::new(self.prj.clone(), id))
            .collect()
    }

    /// `premises()[i]`
    pub fn premise(&self, i: usize) -> Goal {
        let id = self
            .prj
            .with_graph(|g| g.actions[self.id.index()].premises[i]);
        Goal::new(self.prj.clone(), id)
    }

    pub fn results(&self) -> Vec<Goal> {
        let ids = self
            .prj
            .with_graph(|g| g.actions[self.id.index()].results.clone());
        ids.into_iter()
            .map(|id| Goal::new(self.prj.clone(), id))
            .collect()
    }

    /// `results()[i]`
    pub fn result(&self, i: usize) -> Goal {
        let id = self
            .prj
            .with_graph(|g| g.actions[self.id.index()].results[i]);
        Goal::new(self.prj.clone(), id)
    }

    pub fn last_build(&self) -> BuildId {
        self.prj
            .with_graph(|g| g.actions[self.id.index()].last_build.load(Ordering::SeqCst))
    }

    /// Runs the action once per build. Returns the recorded build id when
    /// the action was already run by this or a later build, zero when it
    /// actually ran now.
    ///
    /// Must not run concurrently; [`Goal::lock_pre_actions`] enforces that
    /// before dispatch.
    pub fn run(&self, tr: &Trace, env: &Arc<Env>) -> Result<BuildId, BuildError> {
        let bid = tr.build_id();
        let last = self.last_build();
        if bid <= last {
            return Ok(last);
        }
        tr.check_cancelled()?;
        tracing::debug!(action = %self, build = bid, "run action");
        self.set_last_build(bid);
        let Some(op) = self.operation() else {
            tr.run_implicit_action(self);
            return Ok(0);
        };
        tr.run_action(self);
        let action_env = tr.setup_action_env(env)?;
        let run = op.perform(tr, self, &action_env);
        let run = run.and(tr.close_action_env(action_env));
        match run {
            Ok(()) => Ok(0),
            Err(BuildError::Cancelled) => Err(BuildError::Cancelled),
            Err(err) if self.ignore_error() => {
                tr.warn(&format!("ignoring action '{self}' error: {err}"));
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    /// Contributes the bound operation's identity to `hash`; implicit
    /// actions contribute nothing.
    pub fn write_hash(&self, hash: &mut Sha256, env: &Arc<Env>) -> Result<bool, BuildError> {
        match self.operation() {
            None => Ok(false),
            Some(op) => op.write_hash(hash, self, env),
        }
    }

    pub(crate) fn try_lock(&self, locker: BuildId) -> BuildId {
        self.prj.with_graph(|g| {
            let node = &g.actions[self.id.index()];
            match node
                .lock_owner
                .compare_exchange(0, locker, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => 0,
                Err(holder) => holder,
            }
        })
    }

    pub(crate) fn unlock(&self) {
        self.prj
            .with_graph(|g| g.actions[self.id.index()].lock_owner.store(0, Ordering::SeqCst));
    }

    pub(crate) fn set_last_build(&self, bid: BuildId) {
        self.prj
            .with_graph(|g| g.actions[self.id.index()].last_build.store(bid, Ordering::SeqCst));
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.prj, &other.prj) && self.id == other.id
    }
}

impl Eq for Action {}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operation() {
            None => write!(f, "implicit:{}", self.prj.label()),
            Some(op) => f.write_str(&op.describe(Some(self), None)),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// An [`Operation`] from a description and a closure; handy in build
/// scripts and tests.
pub struct FnOp {
    desc: String,
    f: Box<dyn Fn(&Trace, &Action, &Arc<Env>) -> Result<(), BuildError> + Send + Sync>,
}

impl FnOp {
    pub fn new(
        desc: impl Into<String>,
        f: impl Fn(&Trace, &Action, &Arc<Env>) -> Result<(), BuildError> + Send + Sync + 'static,
    ) -> Self {
        FnOp {
            desc: desc.into(),
            f: Box::new(f),
        }
    }
}

impl Operation for FnOp {
    fn describe(&self, _action: Option<&Action>, _env: Option<&Env>) -> String {
        self.desc.clone()
    }

    fn perform(&self, trace: &Trace, action: &Action, env: &Arc<Env>) -> Result<(), BuildError> {
        tracing::debug!(function = %self.desc, "call function operation");
        (self.f)(trace, action, env)
    }
}
