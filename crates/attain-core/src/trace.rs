// trace.rs — Scoped run-time context and the tracer contract.
//
// A Trace is a parent-linked stack of frames pushed per project and per
// goal. The root carries the tracer sink, the active project, the frame id
// sequence and the cancellation token, so no engine state is global.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::action::Action;
use crate::env::{Env, SharedWriter};
use crate::error::BuildError;
use crate::goal::Goal;
use crate::prefix::PrefixWriter;
use crate::project::Project;
use crate::util;
use crate::BuildId;

/// Cooperative cancellation flag reachable from every [`Trace`]. Operations
/// must observe it between sub-steps.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Structured event sink the engine reports build progress and update
/// decisions to. All methods default to doing nothing, so a tracer
/// implements only what it cares about.
pub trait Tracer: Send + Sync {
    fn debug(&self, _t: &Trace, _msg: &str) {}
    fn info(&self, _t: &Trace, _msg: &str) {}
    fn warn(&self, _t: &Trace, _msg: &str) {}

    fn start_project(&self, _t: &Trace, _prj: &Project, _activity: &str) {}
    fn done_project(&self, _t: &Trace, _prj: &Project, _activity: &str, _took: Duration) {}

    fn run_action(&self, _t: &Trace, _act: &Action) {}
    fn run_implicit_action(&self, _t: &Trace, _act: &Action) {}

    fn schedule_res_time_zero(&self, _t: &Trace, _act: &Action, _res: &Goal) {}
    fn schedule_not_premises(&self, _t: &Trace, _act: &Action, _res: &Goal) {}
    fn schedule_pre_time_zero(&self, _t: &Trace, _act: &Action, _res: &Goal, _pre: &Goal) {}
    fn schedule_outdated(&self, _t: &Trace, _act: &Action, _res: &Goal, _pre: &Goal) {}

    fn check_goal(&self, _t: &Trace, _goal: &Goal) {}
    fn goal_up_to_date(&self, _t: &Trace, _goal: &Goal) {}
    fn goal_needs_actions(&self, _t: &Trace, _goal: &Goal, _n: usize) {}

    fn remove_artefact(&self, _t: &Trace, _goal: &Goal) {}

    /// Prepares the environment an operation runs in. The default wraps the
    /// output and error streams with [`PrefixWriter`]s tagged by build id
    /// and trace position.
    fn setup_action_env(&self, t: &Trace, env: &Arc<Env>) -> Result<Arc<Env>, BuildError> {
        Ok(Arc::new(prefix_action_env(t, env)))
    }

    /// Invoked after the operation ran, with the environment returned by
    /// [`Tracer::setup_action_env`].
    fn close_action_env(&self, _t: &Trace, _env: Arc<Env>) -> Result<(), BuildError> {
        Ok(())
    }
}

/// Wraps the out and err streams of a sub-scope of `env` with line prefixes
/// `{build}@{tag} Out: ` and `{build}@{tag} Err: `.
pub fn prefix_action_env(t: &Trace, env: &Arc<Env>) -> Env {
    let mut sub = env.sub();
    if let Some(out) = sub.out.take() {
        let prefix = format!("{}@{} Out: ", t.build_id(), t.top_tag());
        sub.out = Some(SharedWriter::new(PrefixWriter::new(out, prefix.into_bytes())));
    }
    if let Some(err) = sub.err.take() {
        let prefix = format!("{}@{} Err: ", t.build_id(), t.top_tag());
        sub.err = Some(SharedWriter::new(PrefixWriter::new(err, prefix.into_bytes())));
    }
    sub
}

/// A tracer that swallows every event. Useful as a default and in tests.
pub struct NopTracer;

impl Tracer for NopTracer {}

enum TraceSubject {
    Project(Arc<Project>),
    Goal(Goal),
}

struct TraceFrame {
    up: Option<Arc<TraceFrame>>,
    subject: TraceSubject,
    id: u64,
}

struct TraceRoot {
    tracer: Arc<dyn Tracer>,
    cancel: CancelToken,
    // stack of active projects; nested sub-project builds push and pop
    projects: Mutex<Vec<Arc<Project>>>,
    id_seq: AtomicU64,
}

/// Parent-linked run-time context: the current position in the traversal
/// plus the shared root state.
#[derive(Clone)]
pub struct Trace {
    root: Arc<TraceRoot>,
    top: Option<Arc<TraceFrame>>,
}

impl Trace {
    pub fn new(tracer: Arc<dyn Tracer>) -> Trace {
        Trace::with_cancel(tracer, CancelToken::new())
    }

    pub fn with_cancel(tracer: Arc<dyn Tracer>, cancel: CancelToken) -> Trace {
        Trace {
            root: Arc::new(TraceRoot {
                tracer,
                cancel,
                projects: Mutex::new(Vec::new()),
                id_seq: AtomicU64::new(0),
            }),
            top: None,
        }
    }

    pub fn tracer(&self) -> &Arc<dyn Tracer> {
        &self.root.tracer
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.root.cancel.clone()
    }

    pub fn check_cancelled(&self) -> Result<(), BuildError> {
        if self.root.cancel.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// The build id of the active project, or zero outside a build.
    pub fn build_id(&self) -> BuildId {
        util::lock(&self.root.projects)
            .last()
            .map_or(0, |prj| prj.last_build())
    }

    pub fn top_id(&self) -> u64 {
        self.top.as_ref().map_or(0, |f| f.id)
    }

    /// The tag of the top frame: `{id}` for projects, `[id]` for goals.
    pub fn top_tag(&self) -> String {
        match &self.top {
            None => String::new(),
            Some(frame) => frame_tag(frame),
        }
    }

    /// Concatenated tags from the top frame to the root, e.g. `<[3]{1}>`.
    pub fn path(&self) -> String {
        let mut path = String::from("<");
        let mut frame = self.top.as_deref();
        while let Some(f) = frame {
            path.push_str(&frame_tag(f));
            frame = f.up.as_deref();
        }
        path.push('>');
        path
    }

    /// The goal of the nearest goal frame, when the trace is inside one.
    pub fn current_goal(&self) -> Option<Goal> {
        let mut frame = self.top.as_deref();
        while let Some(f) = frame {
            if let TraceSubject::Goal(goal) = &f.subject {
                return Some(goal.clone());
            }
            frame = f.up.as_deref();
        }
        None
    }

    /// The project of the nearest project frame.
    pub fn current_project(&self) -> Option<Arc<Project>> {
        let mut frame = self.top.as_deref();
        while let Some(f) = frame {
            if let TraceSubject::Project(prj) = &f.subject {
                return Some(prj.clone());
            }
            frame = f.up.as_deref();
        }
        None
    }

    pub(crate) fn push_project(&self, prj: &Arc<Project>) -> Trace {
        self.push(TraceSubject::Project(prj.clone()))
    }

    pub(crate) fn push_goal(&self, goal: &Goal) -> Trace {
        self.push(TraceSubject::Goal(goal.clone()))
    }

    fn push(&self, subject: TraceSubject) -> Trace {
        Trace {
            root: self.root.clone(),
            top: Some(Arc::new(TraceFrame {
                up: self.top.clone(),
                subject,
                id: self.root.id_seq.fetch_add(1, Ordering::SeqCst) + 1,
            })),
        }
    }

    pub fn debug(&self, msg: &str) {
        self.root.tracer.debug(self, msg);
    }

    pub fn info(&self, msg: &str) {
        self.root.tracer.info(self, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.root.tracer.warn(self, msg);
    }

    pub(crate) fn start_project(&self, prj: &Arc<Project>, activity: &str) {
        util::lock(&self.root.projects).push(prj.clone());
        self.root.tracer.start_project(self, prj, activity);
    }

    pub(crate) fn done_project(&self, prj: &Arc<Project>, activity: &str, took: Duration) {
        self.root.tracer.done_project(self, prj, activity, took);
        let mut projects = util::lock(&self.root.projects);
        if let Some(at) = projects.iter().rposition(|p| Arc::ptr_eq(p, prj)) {
            projects.remove(at);
        }
    }

    pub(crate) fn run_action(&self, act: &Action) {
        self.root.tracer.run_action(self, act);
    }

    pub(crate) fn run_implicit_action(&self, act: &Action) {
        self.root.tracer.run_implicit_action(self, act);
    }

    pub(crate) fn schedule_res_time_zero(&self, act: &Action, res: &Goal) {
        self.root.tracer.schedule_res_time_zero(self, act, res);
    }

    pub(crate) fn schedule_not_premises(&self, act: &Action, res: &Goal) {
        self.root.tracer.schedule_not_premises(self, act, res);
    }

    pub(crate) fn schedule_pre_time_zero(&self, act: &Action, res: &Goal, pre: &Goal) {
        self.root.tracer.schedule_pre_time_zero(self, act, res, pre);
    }

    pub(crate) fn schedule_outdated(&self, act: &Action, res: &Goal, pre: &Goal) {
        self.root.tracer.schedule_outdated(self, act, res, pre);
    }

    pub(crate) fn check_goal(&self, goal: &Goal) {
        self.root.tracer.check_goal(self, goal);
    }

    pub(crate) fn goal_up_to_date(&self, goal: &Goal) {
        self.root.tracer.goal_up_to_date(self, goal);
    }

    pub(crate) fn goal_needs_actions(&self, goal: &Goal, n: usize) {
        self.root.tracer.goal_needs_actions(self, goal, n);
    }

    pub(crate) fn remove_artefact(&self, goal: &Goal) {
        self.root.tracer.remove_artefact(self, goal);
    }

    pub(crate) fn setup_action_env(&self, env: &Arc<Env>) -> Result<Arc<Env>, BuildError> {
        self.root.tracer.setup_action_env(self, env)
    }

    pub(crate) fn close_action_env(&self, env: Arc<Env>) -> Result<(), BuildError> {
        self.root.tracer.close_action_env(self, env)
    }
}

fn frame_tag(frame: &TraceFrame) -> String {
    match &frame.subject {
        TraceSubject::Project(_) => format!("{{{}}}", frame.id),
        TraceSubject::Goal(_) => format!("[{}]", frame.id),
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let build = self.build_id();
        if build == 0 {
            f.write_str(&self.path())
        } else {
            write!(f, "{}@{}", build, self.path())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_nests_project_and_goal_tags() {
        let prj = Project::new("");
        let goal = prj.goal(crate::Abstract::new("top")).unwrap();
        let tr = Trace::new(Arc::new(NopTracer));
        assert_eq!(tr.path(), "<>");
        let tp = tr.push_project(&prj);
        assert_eq!(tp.top_tag(), "{1}");
        let tg = tp.push_goal(&goal);
        assert_eq!(tg.top_tag(), "[2]");
        assert_eq!(tg.path(), "<[2]{1}>");
        assert_eq!(tg.current_goal(), Some(goal.clone()));
        assert!(tp.current_goal().is_none());
        assert!(Arc::ptr_eq(&tg.current_project().unwrap(), &prj));
        // pushing from the parent frame forks the path
        let tg2 = tp.push_goal(&goal);
        assert_eq!(tg2.path(), "<[3]{1}>");
    }

    #[test]
    fn cancellation_reaches_every_clone() {
        let tr = Trace::new(Arc::new(NopTracer));
        let prj = Project::new("");
        let sub = tr.push_project(&prj);
        assert!(sub.check_cancelled().is_ok());
        tr.cancel_token().cancel();
        assert!(matches!(
            sub.check_cancelled(),
            Err(BuildError::Cancelled)
        ));
    }
}
