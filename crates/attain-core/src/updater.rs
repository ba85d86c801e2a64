// updater.rs — Decides which producing actions run for one goal.
//
// The update-mode dispatch and its ordering checks are shared between the
// builder and the changer. The updater must not be used concurrently: the
// build id is fixed for one traversal.

use std::sync::Arc;

use crate::action::Action;
use crate::env::Env;
use crate::error::BuildError;
use crate::goal::Goal;
use crate::trace::Trace;
use crate::update::UpdateActions;
use crate::BuildId;

pub(crate) struct Updater {
    pub(crate) env: Arc<Env>,
    pub(crate) bid: BuildId,
}

impl Updater {
    /// Brings one build-locked goal up to date. Returns whether any action
    /// was scheduled (and hence run).
    pub(crate) fn update_goal(&self, tr: &Trace, goal: &Goal) -> Result<bool, BuildError> {
        let _locks = goal.lock_pre_actions(goal.lock_id());

        let scheduled = goal.check_pre_times(tr)?;
        if scheduled.is_empty() {
            tr.goal_up_to_date(goal);
            return Ok(false);
        }
        tr.goal_needs_actions(goal, scheduled.len());

        match goal.update_mode().actions() {
            UpdateActions::All => self.update_all(tr, goal)?,
            UpdateActions::Some => self.update_some(tr, goal, &scheduled)?,
            UpdateActions::Any => self.update_any(tr, goal, &scheduled)?,
            UpdateActions::One => {
                if scheduled.len() > 1 {
                    return Err(BuildError::OneModeChanges {
                        count: scheduled.len(),
                        goal: goal.to_string(),
                    });
                }
                self.update_one(tr, goal, scheduled[0])?;
            }
        }
        Ok(true)
    }

    fn update_all(&self, tr: &Trace, goal: &Goal) -> Result<(), BuildError> {
        let acts = goal.result_of();
        match acts.len() {
            0 => return Ok(()),
            1 => {
                let pre_bid = acts[0].run(tr, &self.env)?;
                if pre_bid > self.bid {
                    return Err(younger(&acts[0], pre_bid));
                }
                return Ok(());
            }
            _ => {}
        }
        if goal.update_mode().ordered() {
            for act in &acts {
                let pre_bid = act.run(tr, &self.env)?;
                if pre_bid == self.bid {
                    return Err(BuildError::OutOfOrder {
                        action: act.to_string(),
                    });
                }
                if pre_bid > self.bid {
                    return Err(younger(act, pre_bid));
                }
            }
        } else {
            for act in &acts {
                let pre_bid = act.run(tr, &self.env)?;
                if pre_bid > self.bid {
                    return Err(younger(act, pre_bid));
                }
            }
        }
        Ok(())
    }

    fn update_some(&self, tr: &Trace, goal: &Goal, scheduled: &[usize]) -> Result<(), BuildError> {
        if scheduled.len() > 1 && goal.update_mode().ordered() {
            for &idx in scheduled {
                let act = goal.pre_action(idx);
                let pre_bid = act.run(tr, &self.env)?;
                if pre_bid == self.bid {
                    return Err(BuildError::OutOfOrder {
                        action: act.to_string(),
                    });
                }
                if pre_bid > self.bid {
                    return Err(younger(&act, pre_bid));
                }
            }
        } else {
            for &idx in scheduled {
                let act = goal.pre_action(idx);
                let pre_bid = act.run(tr, &self.env)?;
                if pre_bid > self.bid {
                    return Err(younger(&act, pre_bid));
                }
            }
        }
        Ok(())
    }

    fn update_any(&self, tr: &Trace, goal: &Goal, scheduled: &[usize]) -> Result<(), BuildError> {
        let acts = goal.result_of();
        let mut done: Option<usize> = None;
        for (i, act) in acts.iter().enumerate() {
            let pre_bid = act.last_build();
            if pre_bid > self.bid {
                return Err(younger(act, pre_bid));
            }
            if pre_bid == self.bid {
                if !scheduled.contains(&i) {
                    return Err(BuildError::AnyModeInconsistent {
                        goal: goal.to_string(),
                    });
                }
                if done.is_some() {
                    return Err(BuildError::AnyModeMultiple {
                        goal: goal.to_string(),
                    });
                }
                done = Some(i);
            }
        }
        if done.is_some() {
            return Ok(());
        }
        acts[scheduled[0]].run(tr, &self.env)?;
        Ok(())
    }

    fn update_one(&self, tr: &Trace, goal: &Goal, scheduled: usize) -> Result<(), BuildError> {
        let acts = goal.result_of();
        for (i, act) in acts.iter().enumerate() {
            let pre_bid = act.last_build();
            if pre_bid > self.bid {
                return Err(younger(act, pre_bid));
            }
            if pre_bid == self.bid {
                if i == scheduled {
                    return Ok(());
                }
                return Err(BuildError::OneModeInconsistent {
                    goal: goal.to_string(),
                });
            }
        }
        acts[scheduled].run(tr, &self.env)?;
        Ok(())
    }
}

fn younger(act: &Action, build: BuildId) -> BuildError {
    BuildError::YoungerBuild {
        action: act.to_string(),
        build,
    }
}
