// goal.rs — Goal handles over the project arena.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use crate::action::{Action, ActionId};
use crate::artefact::{Abstract, Artefact};
use crate::error::BuildError;
use crate::project::Project;
use crate::trace::Trace;
use crate::update::UpdateMode;
use crate::BuildId;

/// Index of a goal within its project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GoalId(pub(crate) usize);

impl GoalId {
    pub fn index(self) -> usize {
        self.0
    }
}

pub(crate) struct GoalNode {
    pub(crate) artefact: Arc<dyn Artefact>,
    pub(crate) update_mode: UpdateMode,
    pub(crate) removable: bool,
    pub(crate) result_of: Vec<ActionId>,
    pub(crate) premise_of: Vec<ActionId>,
    pub(crate) last_build: AtomicU64,
}

impl GoalNode {
    pub(crate) fn new(artefact: Arc<dyn Artefact>) -> Self {
        GoalNode {
            artefact,
            update_mode: UpdateMode::default(),
            removable: false,
            result_of: Vec::new(),
            premise_of: Vec::new(),
            last_build: AtomicU64::new(0),
        }
    }
}

/// A Goal is something to achieve in a [`Project`]. Each goal is associated
/// with an [`Artefact`] that is considered available and up to date when the
/// goal is reached. Goals are reached through [`Action`]s; a goal can be the
/// result of several actions, governed by its [`UpdateMode`], and it can be
/// the premise of further actions, which must not run before it is reached.
#[derive(Clone)]
pub struct Goal {
    prj: Arc<Project>,
    id: GoalId,
}

impl Goal {
    pub(crate) fn new(prj: Arc<Project>, id: GoalId) -> Self {
        Goal { prj, id }
    }

    pub fn id(&self) -> GoalId {
        self.id
    }

    pub fn project(&self) -> &Arc<Project> {
        &self.prj
    }

    pub fn artefact(&self) -> Arc<dyn Artefact> {
        self.prj
            .with_graph(|g| g.goals[self.id.index()].artefact.clone())
    }

    pub fn name(&self) -> String {
        self.artefact().name(&self.prj)
    }

    pub fn kind(&self) -> &'static str {
        self.artefact().kind()
    }

    pub fn is_abstract(&self) -> bool {
        self.artefact().as_any().is::<Abstract>()
    }

    pub fn state_at(&self) -> Result<Option<SystemTime>, BuildError> {
        self.artefact().state_at(&self.prj)
    }

    pub fn update_mode(&self) -> UpdateMode {
        self.prj.with_graph(|g| g.goals[self.id.index()].update_mode)
    }

    pub fn set_update_mode(&self, mode: UpdateMode) {
        self.prj
            .with_graph_mut(|g| g.goals[self.id.index()].update_mode = mode);
    }

    /// Whether the cleaner may remove this goal's artefact.
    pub fn removable(&self) -> bool {
        self.prj.with_graph(|g| g.goals[self.id.index()].removable)
    }

    pub fn set_removable(&self, removable: bool) {
        self.prj
            .with_graph_mut(|g| g.goals[self.id.index()].removable = removable);
    }

    /// The actions that result in this goal.
    pub fn result_of(&self) -> Vec<Action> {
        let ids = self
            .prj
            .with_graph(|g| g.goals[self.id.index()].result_of.clone());
        ids.into_iter()
            .map(|id| Action::new(self.prj.clone(), id))
            .collect()
    }

    /// `result_of()[i]`
    pub fn pre_action(&self, i: usize) -> Action {
        let id = self
            .prj
            .with_graph(|g| g.goals[self.id.index()].result_of[i]);
        Action::new(self.prj.clone(), id)
    }

    /// The actions that depend on this goal.
    pub fn premise_of(&self) -> Vec<Action> {
        let ids = self
            .prj
            .with_graph(|g| g.goals[self.id.index()].premise_of.clone());
        ids.into_iter()
            .map(|id| Action::new(self.prj.clone(), id))
            .collect()
    }

    pub fn last_build(&self) -> BuildId {
        self.prj
            .with_graph(|g| g.goals[self.id.index()].last_build.load(Ordering::SeqCst))
    }

    fn result_of_ids(&self) -> Vec<ActionId> {
        self.prj
            .with_graph(|g| g.goals[self.id.index()].result_of.clone())
    }

    /// Checks that this goal agrees with the co-result goal `involved` about
    /// the actions producing them: either both are ordered over the same
    /// action sequence, or both unordered over the same action set.
    pub(crate) fn update_consistency(&self, involved: &Goal) -> Result<(), BuildError> {
        if self == involved {
            return Ok(());
        }
        let mine = self.result_of_ids();
        let theirs = involved.result_of_ids();
        match mine.len() {
            0 => return Ok(()),
            1 if theirs.len() <= 1 => return Ok(()),
            _ => {}
        }
        if mine.len() != theirs.len() {
            return Err(BuildError::ActionCountConflict {
                goal: self.to_string(),
                involved: involved.to_string(),
            });
        }
        if involved.update_mode().ordered() {
            if !self.update_mode().ordered() {
                return Err(BuildError::OrderingConflict {
                    ordered: involved.to_string(),
                    unordered: self.to_string(),
                });
            }
            if mine != theirs {
                return Err(BuildError::ActionSetConflict {
                    goal: self.to_string(),
                    involved: involved.to_string(),
                });
            }
            return Ok(());
        }
        if self.update_mode().ordered() {
            return Err(BuildError::OrderingConflict {
                ordered: self.to_string(),
                unordered: involved.to_string(),
            });
        }
        for id in &mine {
            if !theirs.contains(id) {
                return Err(BuildError::ActionSetConflict {
                    goal: self.to_string(),
                    involved: involved.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Checks whether this goal needs an update according to the timestamps
    /// of all premises of its producing actions. Returns the indices of the
    /// actions that must run.
    pub(crate) fn check_pre_times(&self, tr: &Trace) -> Result<Vec<usize>, BuildError> {
        let mut scheduled = Vec::new();
        let own_state = self.state_at()?;
        for (idx, act) in self.result_of().into_iter().enumerate() {
            let Some(own_state) = own_state else {
                tr.schedule_res_time_zero(&act, self);
                scheduled.push(idx);
                continue;
            };
            let premises = act.premises();
            if premises.is_empty() {
                tr.schedule_not_premises(&act, self);
                scheduled.push(idx);
                continue;
            }
            for pre in &premises {
                match pre.state_at()? {
                    None => {
                        tr.schedule_pre_time_zero(&act, self, pre);
                        scheduled.push(idx);
                        break;
                    }
                    Some(pre_state) if own_state < pre_state => {
                        tr.schedule_outdated(&act, self, pre);
                        scheduled.push(idx);
                        break;
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(scheduled)
    }

    /// Claims this goal for the project's current build. Returns the build
    /// id on the first claim, zero when the goal was already processed in
    /// this build.
    pub(crate) fn lock_build(&self) -> BuildId {
        let current = self.prj.last_build();
        let claimed = self.prj.with_graph(|g| {
            g.goals[self.id.index()]
                .last_build
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                    (last < current).then_some(current)
                })
                .is_ok()
        });
        if claimed {
            current
        } else {
            0
        }
    }

    /// Locker id used in the pre-action lock protocol; nonzero per goal.
    pub(crate) fn lock_id(&self) -> BuildId {
        self.id.index() as BuildId + 1
    }

    /// Atomically acquires the lock on every producing action. When an
    /// acquisition is blocked by a locker with a higher id, everything
    /// acquired so far is released and the acquisition restarts after a
    /// short pause; the lowest locker yields, which guarantees progress.
    pub(crate) fn lock_pre_actions(&self, locker: BuildId) -> PreActionLocks<'_> {
        let acts = self.result_of();
        let mut locked = vec![false; acts.len()];
        let mut todo = acts.len();
        'acquire: while todo > 0 {
            for (i, act) in acts.iter().enumerate() {
                if locked[i] {
                    continue;
                }
                let blocking = act.try_lock(locker);
                if blocking == 0 {
                    locked[i] = true;
                    todo -= 1;
                } else if blocking > locker {
                    // lost against a higher locker: release and restart
                    for (j, l) in locked.iter_mut().enumerate() {
                        if *l {
                            acts[j].unlock();
                            *l = false;
                        }
                    }
                    todo = acts.len();
                    tracing::debug!(goal = %self, blocking, "pre-action lock restart");
                    thread::sleep(Duration::from_millis(1));
                    continue 'acquire;
                }
            }
        }
        PreActionLocks { goal: self }
    }
}

/// Holds the locks on a goal's producing actions; dropping releases them.
pub(crate) struct PreActionLocks<'g> {
    goal: &'g Goal,
}

impl Drop for PreActionLocks<'_> {
    fn drop(&mut self) {
        for act in self.goal.result_of() {
            act.unlock();
        }
    }
}

impl PartialEq for Goal {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.prj, &other.prj) && self.id == other.id
    }
}

impl Eq for Goal {}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name(), self.kind())
    }
}

// Debug carries the artefact name, which is what failing tests need.
impl fmt::Debug for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artefact::Abstract;
    use crate::project::Project;

    #[test]
    fn lock_build_claims_once_per_build() {
        let prj = Project::new("");
        let g = prj.goal(Abstract::new("g")).unwrap();
        assert_eq!(g.lock_build(), 0, "no build started yet");
        let lock = prj.lock_build();
        assert_eq!(g.lock_build(), lock.build_id());
        assert_eq!(g.lock_build(), 0, "second claim in the same build");
        drop(lock);
        let lock = prj.lock_build();
        assert_eq!(g.lock_build(), lock.build_id());
    }

    #[test]
    fn pre_action_locks_block_and_release() {
        let prj = Project::new("");
        let g = prj.goal(Abstract::new("g")).unwrap();
        prj.new_action(&[], &[g.clone()], None).unwrap();
        prj.new_action(&[], &[g.clone()], None).unwrap();

        // higher locker holds; a lower one must wait until release
        let held = g.lock_pre_actions(7);
        let contender = {
            let g = g.clone();
            thread::spawn(move || {
                let locks = g.lock_pre_actions(3);
                drop(locks);
            })
        };
        thread::sleep(Duration::from_millis(10));
        assert!(!contender.is_finished(), "lower locker must yield");
        drop(held);
        contender.join().unwrap();

        // and the other way around: a higher locker wins after release
        let held = g.lock_pre_actions(3);
        let contender = {
            let g = g.clone();
            thread::spawn(move || {
                let locks = g.lock_pre_actions(9);
                drop(locks);
            })
        };
        thread::sleep(Duration::from_millis(10));
        drop(held);
        contender.join().unwrap();
    }
}
