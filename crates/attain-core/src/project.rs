// project.rs — Owning container of the goal/action graph.
//
// Goals and actions live in arenas owned by the project; edges are stored
// as indices. Handles ([`Goal`], [`Action`]) pair a project `Arc` with an
// index, which keeps the shared graph free of owning cycles while giving
// O(1) neighbor access.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock, Weak};
use std::time::SystemTime;

use crate::action::{Action, ActionId, ActionNode, Operation};
use crate::artefact::{Artefact, ArtefactKey};
use crate::error::BuildError;
use crate::goal::{Goal, GoalId, GoalNode};
use crate::util;
use crate::BuildId;

pub(crate) struct Graph {
    pub(crate) goals: Vec<GoalNode>,
    pub(crate) actions: Vec<ActionNode>,
    by_key: HashMap<ArtefactKey, GoalId>,
}

/// A project owns a graph of [`Goal`]s connected by [`Action`]s, rooted at
/// a filesystem directory. A project can itself be an artefact inside
/// another project, which makes it a sub-project.
pub struct Project {
    dir: PathBuf,
    graph: RwLock<Graph>,
    build: Mutex<()>,
    last_build: AtomicU64,
    parent: OnceLock<Weak<Project>>,
}

impl Project {
    /// Creates a project rooted at `dir`; an empty path roots it at the
    /// process working directory.
    pub fn new(dir: impl Into<PathBuf>) -> Arc<Project> {
        let mut dir = dir.into();
        if dir.as_os_str().is_empty() {
            dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        }
        Arc::new(Project {
            dir,
            graph: RwLock::new(Graph {
                goals: Vec::new(),
                actions: Vec::new(),
                by_key: HashMap::new(),
            }),
            build: Mutex::new(()),
            last_build: AtomicU64::new(0),
            parent: OnceLock::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn parent(&self) -> Option<Arc<Project>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    /// Base name of the project directory, used in messages.
    pub fn label(&self) -> String {
        let dir = if self.dir == Path::new(".") {
            self.dir.canonicalize().unwrap_or_else(|_| self.dir.clone())
        } else {
            self.dir.clone()
        };
        match dir.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => dir.display().to_string(),
        }
    }

    /// Looks the goal of `artefact` up, creating it on first sight. A
    /// project artefact is adopted as a sub-project of this one; adopting a
    /// project that already has a different parent fails.
    pub fn goal(self: &Arc<Self>, artefact: impl Artefact) -> Result<Goal, BuildError> {
        self.goal_arc(Arc::new(artefact))
    }

    pub fn goal_arc(self: &Arc<Self>, artefact: Arc<dyn Artefact>) -> Result<Goal, BuildError> {
        let key = artefact.key();
        if let Some(&id) = util::read(&self.graph).by_key.get(&key) {
            return Ok(Goal::new(self.clone(), id));
        }
        if let Some(sub) = artefact.as_project() {
            if sub.parent.set(Arc::downgrade(self)).is_err() {
                match sub.parent() {
                    Some(parent) if Arc::ptr_eq(&parent, self) => {}
                    Some(parent) => {
                        return Err(BuildError::SubProjectOwned {
                            sub: Artefact::name(sub, &parent),
                            parent: parent.label(),
                            project: self.label(),
                        })
                    }
                    // parent project is gone; the goal keeps the sub alive
                    None => {}
                }
            }
        }
        let mut graph = util::write(&self.graph);
        if let Some(&id) = graph.by_key.get(&key) {
            return Ok(Goal::new(self.clone(), id));
        }
        let id = GoalId(graph.goals.len());
        graph.goals.push(GoalNode::new(artefact));
        graph.by_key.insert(key, id);
        Ok(Goal::new(self.clone(), id))
    }

    /// Creates an action from `premises` to `results` performing `op`; no
    /// operation makes the action implicit. There must be at least one
    /// result, every linked goal must belong to this project, and the
    /// result goals' update modes must be consistent.
    pub fn new_action(
        self: &Arc<Self>,
        premises: &[Goal],
        results: &[Goal],
        op: Option<Arc<dyn Operation>>,
    ) -> Result<Action, BuildError> {
        if results.is_empty() {
            let op = op.map_or_else(|| "implicit".to_string(), |op| op.describe(None, None));
            return Err(BuildError::ActionWithoutResult { op });
        }
        for g in premises.iter().chain(results) {
            if !Arc::ptr_eq(g.project(), self) {
                return Err(BuildError::ForeignGoal {
                    goal: g.name(),
                    project: self.label(),
                });
            }
        }
        let id = {
            let mut graph = util::write(&self.graph);
            let id = ActionId(graph.actions.len());
            graph.actions.push(ActionNode::new(
                op,
                premises.iter().map(Goal::id).collect(),
                results.iter().map(Goal::id).collect(),
            ));
            for g in premises {
                graph.goals[g.id().index()].premise_of.push(id);
            }
            for g in results {
                graph.goals[g.id().index()].result_of.push(id);
            }
            id
        };
        for g in results {
            for involved in results {
                if let Err(err) = g.update_consistency(involved) {
                    self.unwire_action(id, premises, results);
                    return Err(err);
                }
            }
        }
        Ok(Action::new(self.clone(), id))
    }

    // Rolls the newest action back out of the arena after a failed
    // consistency check.
    fn unwire_action(&self, id: ActionId, premises: &[Goal], results: &[Goal]) {
        let mut graph = util::write(&self.graph);
        debug_assert_eq!(id.index(), graph.actions.len() - 1);
        graph.actions.pop();
        for g in premises {
            graph.goals[g.id().index()].premise_of.retain(|&a| a != id);
        }
        for g in results {
            graph.goals[g.id().index()].result_of.retain(|&a| a != id);
        }
    }

    /// Acquires the build lock and allocates the next build id. The lock is
    /// held until the returned guard drops.
    pub fn lock_build(&self) -> BuildLock<'_> {
        let guard = util::lock(&self.build);
        let bid = self.last_build.fetch_add(1, Ordering::SeqCst) + 1;
        BuildLock { _guard: guard, bid }
    }

    /// The id of the current (or most recent) build; zero before the first.
    pub fn last_build(&self) -> BuildId {
        self.last_build.load(Ordering::SeqCst)
    }

    /// Every goal of the project, in creation order.
    pub fn goals(self: &Arc<Self>) -> Vec<Goal> {
        let len = util::read(&self.graph).goals.len();
        (0..len).map(|i| Goal::new(self.clone(), GoalId(i))).collect()
    }

    /// Every action of the project, in creation order.
    pub fn actions(self: &Arc<Self>) -> Vec<Action> {
        let len = util::read(&self.graph).actions.len();
        (0..len)
            .map(|i| Action::new(self.clone(), ActionId(i)))
            .collect()
    }

    /// Goals that are not premise of any action. Builds start here.
    pub fn leafs(self: &Arc<Self>) -> Vec<Goal> {
        let graph = util::read(&self.graph);
        let ids: Vec<GoalId> = graph
            .goals
            .iter()
            .enumerate()
            .filter(|(_, node)| node.premise_of.is_empty())
            .map(|(i, _)| GoalId(i))
            .collect();
        drop(graph);
        ids.into_iter().map(|id| Goal::new(self.clone(), id)).collect()
    }

    /// Goals that are not the result of any action.
    pub fn roots(self: &Arc<Self>) -> Vec<Goal> {
        let graph = util::read(&self.graph);
        let ids: Vec<GoalId> = graph
            .goals
            .iter()
            .enumerate()
            .filter(|(_, node)| node.result_of.is_empty())
            .map(|(i, _)| GoalId(i))
            .collect();
        drop(graph);
        ids.into_iter().map(|id| Goal::new(self.clone(), id)).collect()
    }

    /// Linear lookup by the artefact's unique name.
    pub fn find_goal(self: &Arc<Self>, name: &str) -> Option<Goal> {
        self.goals().into_iter().find(|g| g.name() == name)
    }

    /// Absolute form of a project-relative path, honoring parent projects.
    pub fn abs_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, BuildError> {
        let path = path.as_ref();
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        Ok(self.abs_dir()?.join(path))
    }

    /// Absolute form of the project root directory.
    pub fn abs_dir(&self) -> Result<PathBuf, BuildError> {
        if self.dir.is_absolute() {
            return Ok(self.dir.clone());
        }
        match self.parent() {
            Some(parent) => Ok(parent.abs_dir()?.join(&self.dir)),
            None => {
                let cwd =
                    std::env::current_dir().map_err(|e| BuildError::io(&self.dir, e))?;
                Ok(cwd.join(&self.dir))
            }
        }
    }

    /// `path` relative to the project root. A relative path is taken to be
    /// project-relative already; an absolute path outside the root is
    /// returned unchanged.
    pub fn rel_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_relative() {
            return path.to_path_buf();
        }
        match self.abs_dir() {
            Ok(dir) => match path.strip_prefix(&dir) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => path.to_path_buf(),
            },
            Err(_) => path.to_path_buf(),
        }
    }

    pub(crate) fn with_graph<R>(&self, f: impl FnOnce(&Graph) -> R) -> R {
        f(&util::read(&self.graph))
    }

    pub(crate) fn with_graph_mut<R>(&self, f: impl FnOnce(&mut Graph) -> R) -> R {
        f(&mut util::write(&self.graph))
    }

    /// State of an abstract goal: unknown as soon as any real action
    /// produces it, otherwise the newest premise state across the implicit
    /// actions producing it.
    pub(crate) fn abstract_state(
        &self,
        key: &ArtefactKey,
    ) -> Result<Option<SystemTime>, BuildError> {
        let producers: Vec<(bool, Vec<Arc<dyn Artefact>>)> = self.with_graph(|graph| {
            let Some(&gid) = graph.by_key.get(key) else {
                return Vec::new();
            };
            graph.goals[gid.index()]
                .result_of
                .iter()
                .map(|&aid| {
                    let act = &graph.actions[aid.index()];
                    (
                        act.op.is_none(),
                        act.premises
                            .iter()
                            .map(|&p| graph.goals[p.index()].artefact.clone())
                            .collect(),
                    )
                })
                .collect()
        });
        if producers.iter().any(|(implicit, _)| !implicit) {
            return Ok(None);
        }
        let mut newest: Option<SystemTime> = None;
        for (_, premises) in producers {
            for pre in premises {
                if let Some(t) = pre.state_at(self)? {
                    if newest.map_or(true, |cur| t > cur) {
                        newest = Some(t);
                    }
                }
            }
        }
        Ok(newest)
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A project used as an artefact: its goal is reached when all leaf goals
/// of the sub-project are.
impl Artefact for Arc<Project> {
    fn key(&self) -> ArtefactKey {
        ArtefactKey::new(format!("project:{}", self.dir.display()))
    }

    fn kind(&self) -> &'static str {
        "project"
    }

    fn name(&self, in_prj: &Project) -> String {
        let rel = in_prj.rel_path(&self.dir);
        rel.display().to_string().replace('\\', "/")
    }

    fn state_at(&self, _in_prj: &Project) -> Result<Option<SystemTime>, BuildError> {
        let mut newest: Option<SystemTime> = None;
        for leaf in self.leafs() {
            if let Some(t) = leaf.state_at()? {
                if newest.map_or(true, |cur| t > cur) {
                    newest = Some(t);
                }
            }
        }
        Ok(newest)
    }

    fn as_project(&self) -> Option<&Arc<Project>> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Holds a project's build lock; dropping it finishes the build session.
pub struct BuildLock<'prj> {
    _guard: MutexGuard<'prj, ()>,
    bid: BuildId,
}

impl BuildLock<'_> {
    pub fn build_id(&self) -> BuildId {
        self.bid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artefact::Abstract;
    use crate::update::UpdateMode;

    #[test]
    fn goal_is_deduplicated_by_artefact_key() {
        let prj = Project::new("");
        let a = prj.goal(Abstract::new("x")).unwrap();
        let b = prj.goal(Abstract::new("x")).unwrap();
        assert_eq!(a, b);
        assert_eq!(prj.goals().len(), 1);
    }

    #[test]
    fn action_needs_results() {
        let prj = Project::new("");
        let pre = prj.goal(Abstract::new("pre")).unwrap();
        let err = prj.new_action(&[pre], &[], None).unwrap_err();
        assert!(matches!(err, BuildError::ActionWithoutResult { .. }));
    }

    #[test]
    fn action_rejects_foreign_goals() {
        let here = Project::new("here");
        let there = Project::new("there");
        let pre = there.goal(Abstract::new("pre")).unwrap();
        let res = here.goal(Abstract::new("res")).unwrap();
        let err = here.new_action(&[pre], &[res], None).unwrap_err();
        assert!(matches!(err, BuildError::ForeignGoal { .. }));
    }

    #[test]
    fn leafs_and_roots() {
        let prj = Project::new("");
        let src = prj.goal(Abstract::new("src")).unwrap();
        let dst = prj.goal(Abstract::new("dst")).unwrap();
        prj.new_action(&[src.clone()], &[dst.clone()], None).unwrap();
        assert_eq!(prj.leafs(), vec![dst.clone()]);
        assert_eq!(prj.roots(), vec![src.clone()]);
    }

    #[test]
    fn build_ids_increase_monotonically() {
        let prj = Project::new("");
        let first = prj.lock_build().build_id();
        let second = prj.lock_build().build_id();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(prj.last_build(), 2);
    }

    #[test]
    fn sub_project_adoption_is_exclusive() {
        let parent = Project::new("parent");
        let other = Project::new("other");
        let sub = Project::new("sub");
        parent.goal(sub.clone()).unwrap();
        assert!(sub.parent().is_some());
        let err = other.goal(sub.clone()).unwrap_err();
        assert!(matches!(err, BuildError::SubProjectOwned { .. }));
        // re-adding to the owning parent dedupes onto the same goal
        parent.goal(sub).unwrap();
        assert_eq!(parent.goals().len(), 1);
    }

    #[test]
    fn inconsistent_update_modes_are_rejected_and_rolled_back() {
        let prj = Project::new("");
        let r1 = prj.goal(Abstract::new("r1")).unwrap();
        let r2 = prj.goal(Abstract::new("r2")).unwrap();
        // both goals get a producing action each, then one shared action:
        // r1 ordered, r2 unordered is inconsistent
        prj.new_action(&[], &[r1.clone()], None).unwrap();
        prj.new_action(&[], &[r2.clone()], None).unwrap();
        r2.set_update_mode(UpdateMode::ALL_ACTIONS | UpdateMode::UNORDERED);
        let err = prj
            .new_action(&[], &[r1.clone(), r2.clone()], None)
            .unwrap_err();
        assert!(matches!(err, BuildError::OrderingConflict { .. }));
        // the failed action must not stay wired into the graph
        assert_eq!(r1.result_of().len(), 1);
        assert_eq!(r2.result_of().len(), 1);
        assert_eq!(prj.actions().len(), 2);
    }

    #[test]
    fn rel_path_strips_the_project_root() {
        let prj = Project::new("/tmp/prj");
        assert_eq!(prj.rel_path("/tmp/prj/doc/a.md"), PathBuf::from("doc/a.md"));
        assert_eq!(prj.rel_path("doc/a.md"), PathBuf::from("doc/a.md"));
        assert_eq!(prj.abs_path("doc").unwrap(), PathBuf::from("/tmp/prj/doc"));
    }
}
