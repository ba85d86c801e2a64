// changer.rs — Propagates updates downstream from changed goals.

use std::sync::Arc;
use std::time::Instant;

use crate::env::Env;
use crate::error::BuildError;
use crate::goal::Goal;
use crate::trace::Trace;
use crate::updater::Updater;

/// Walks the outgoing (`premise_of`) edges of changed goals and re-builds
/// their downstream closure. The update decisions are the same as the
/// builder's; only the walking direction differs.
#[derive(Default)]
pub struct Changer {
    env: Option<Arc<Env>>,
}

impl Changer {
    pub fn new() -> Self {
        Changer::default()
    }

    /// The environment actions run in; defaults to [`Env::host`].
    pub fn with_env(mut self, env: Arc<Env>) -> Self {
        self.env = Some(env);
        self
    }

    /// Propagates updates downstream from each goal in `goals`, locking
    /// their projects as the group changes.
    pub fn goals(&self, tr: &Trace, goals: &[Goal]) -> Result<(), BuildError> {
        let mut i = 0;
        while i < goals.len() {
            let prj = goals[i].project().clone();
            let lock = prj.lock_build();
            let start = Instant::now();
            let tr = tr.push_project(&prj);
            tr.start_project(&prj, "updating");
            let env = match &self.env {
                Some(env) => env.clone(),
                None => Arc::new(Env::host()),
            };
            let up = Updater {
                env,
                bid: lock.build_id(),
            };
            while i < goals.len() && Arc::ptr_eq(goals[i].project(), &prj) {
                let goal = &goals[i];
                tr.check_goal(goal);
                for act in goal.premise_of() {
                    for res in act.results() {
                        Self::update(&up, &tr, &res)?;
                    }
                }
                i += 1;
            }
            tr.done_project(&prj, "updating", start.elapsed());
            drop(lock);
        }
        Ok(())
    }

    fn update(up: &Updater, tr: &Trace, goal: &Goal) -> Result<(), BuildError> {
        tr.check_cancelled()?;
        let tr = tr.push_goal(goal);
        if up.update_goal(&tr, goal)? {
            for act in goal.premise_of() {
                for res in act.results() {
                    Self::update(up, &tr, &res)?;
                }
            }
        }
        Ok(())
    }
}
