// builder.rs — Premises-first DAG walker driving the updater.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;

use crate::action::{Action, Operation};
use crate::artefact::{Abstract, Artefact};
use crate::env::{Env, SharedWriter};
use crate::error::BuildError;
use crate::goal::Goal;
use crate::project::Project;
use crate::trace::Trace;
use crate::updater::Updater;
use crate::BuildId;

/// Builds projects by walking every leaf goal premises-first and handing
/// each visited goal to the updater.
///
/// A builder is itself an [`Operation`]: bound to an action whose results
/// are project artefacts, it builds those sub-projects, which composes
/// projects into larger ones.
#[derive(Default)]
pub struct Builder {
    env: Option<Arc<Env>>,
    log_dir: Option<PathBuf>,
}

impl Builder {
    pub fn new() -> Self {
        Builder::default()
    }

    /// The environment actions run in; defaults to [`Env::host`].
    pub fn with_env(mut self, env: Arc<Env>) -> Self {
        self.env = Some(env);
        self
    }

    /// Tees action output into `<dir>/<stamp>.<build-id>/build.{out,err}`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Builds all leafs of `prj`.
    pub fn project(&self, prj: &Arc<Project>, tr: &Trace) -> Result<(), BuildError> {
        let lock = prj.lock_build();
        let env = self.run_env(lock.build_id())?;
        let up = Updater {
            env,
            bid: lock.build_id(),
        };
        Self::build_project(&up, tr, prj)
    }

    fn build_project(up: &Updater, tr: &Trace, prj: &Arc<Project>) -> Result<(), BuildError> {
        let start = Instant::now();
        let tr = tr.push_project(prj);
        tr.start_project(prj, "building");
        for leaf in prj.leafs() {
            Self::build_goal(up, &tr, &leaf)?;
        }
        tr.done_project(prj, "building", start.elapsed());
        Ok(())
    }

    /// Builds explicit goals, locking their projects as the group changes.
    pub fn goals(&self, tr: &Trace, goals: &[Goal]) -> Result<(), BuildError> {
        let mut i = 0;
        while i < goals.len() {
            let prj = goals[i].project().clone();
            let lock = prj.lock_build();
            let start = Instant::now();
            let tr = tr.push_project(&prj);
            tr.start_project(&prj, "building");
            let env = self.run_env(lock.build_id())?;
            let up = Updater {
                env,
                bid: lock.build_id(),
            };
            while i < goals.len() && Arc::ptr_eq(goals[i].project(), &prj) {
                Self::build_goal(&up, &tr, &goals[i])?;
                i += 1;
            }
            tr.done_project(&prj, "building", start.elapsed());
            drop(lock);
        }
        Ok(())
    }

    /// Resolves `names` in `prj` and builds the named goals.
    pub fn named_goals(
        &self,
        prj: &Arc<Project>,
        tr: &Trace,
        names: &[&str],
    ) -> Result<(), BuildError> {
        let mut goals = Vec::with_capacity(names.len());
        for name in names {
            let goal = prj.find_goal(name).ok_or_else(|| BuildError::UnknownGoal {
                name: name.to_string(),
                project: prj.label(),
            })?;
            goals.push(goal);
        }
        self.goals(tr, &goals)
    }

    fn build_goal(up: &Updater, tr: &Trace, goal: &Goal) -> Result<(), BuildError> {
        tr.check_cancelled()?;
        if goal.lock_build() == 0 {
            return Ok(());
        }
        let tr = tr.push_goal(goal);
        tr.check_goal(goal);
        let acts = goal.result_of();
        if acts.is_empty() {
            return Ok(());
        }
        for act in &acts {
            for pre in act.premises() {
                Self::build_goal(up, &tr, &pre)?;
            }
        }
        up.update_goal(&tr, goal)?;
        Ok(())
    }

    fn run_env(&self, bid: BuildId) -> Result<Arc<Env>, BuildError> {
        let base = match &self.env {
            Some(env) => env.clone(),
            None => Arc::new(Env::host()),
        };
        let Some(log_dir) = &self.log_dir else {
            return Ok(base);
        };
        let build_dir = log_dir.join(format!(
            "{}.{}",
            Local::now().format("%y%m%d-%H%M%S"),
            bid
        ));
        fs::create_dir_all(&build_dir).map_err(|e| BuildError::io(&build_dir, e))?;
        let out_path = build_dir.join("build.out");
        let out_file = fs::File::create(&out_path).map_err(|e| BuildError::io(&out_path, e))?;
        let err_path = build_dir.join("build.err");
        let err_file = fs::File::create(&err_path).map_err(|e| BuildError::io(&err_path, e))?;

        let mut env = base.sub();
        env.out = Some(SharedWriter::new(TeeWriter {
            top: out_file,
            tail: env.out.take(),
        }));
        env.err = Some(SharedWriter::new(TeeWriter {
            top: err_file,
            tail: env.err.take(),
        }));
        Ok(Arc::new(env))
    }
}

// Duplicates writes into the per-build log file and the original stream.
struct TeeWriter {
    top: fs::File,
    tail: Option<SharedWriter>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.top.write_all(buf)?;
        if let Some(tail) = &mut self.tail {
            tail.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.top.flush()?;
        if let Some(tail) = &mut self.tail {
            tail.flush()?;
        }
        Ok(())
    }
}

impl Operation for Builder {
    fn describe(&self, _action: Option<&Action>, _env: Option<&Env>) -> String {
        "build project".to_string()
    }

    /// Builds every result goal whose artefact is a project; abstract
    /// results are allowed as grouping markers.
    fn perform(&self, tr: &Trace, action: &Action, _env: &Arc<Env>) -> Result<(), BuildError> {
        let mut projects = Vec::new();
        for res in action.results() {
            let artefact = res.artefact();
            if artefact.as_any().is::<Abstract>() {
                continue;
            }
            match artefact.as_project() {
                Some(prj) => projects.push(prj.clone()),
                None => {
                    return Err(BuildError::IllegalBuildTarget {
                        kind: artefact.kind().to_string(),
                        name: res.name(),
                    })
                }
            }
        }
        for prj in projects {
            self.project(&prj, tr)?;
        }
        Ok(())
    }
}
