// cleaner.rs — Removes removable artefacts of produced goals.

use std::sync::Arc;
use std::time::Instant;

use crate::artefact::{Artefact, RemovableArtefact};
use crate::error::BuildError;
use crate::project::Project;
use crate::trace::Trace;

/// Removes the artefact of every goal that is produced by at least one
/// action, marked removable, and whose artefact supports removal and
/// currently exists. With `dry_run` the removals are only traced.
pub fn clean(prj: &Arc<Project>, dry_run: bool, tr: &Trace) -> Result<(), BuildError> {
    let _lock = prj.lock_build();
    let start = Instant::now();
    let tr = tr.push_project(prj);
    tr.start_project(prj, "cleaning");
    for goal in prj.goals() {
        if goal.result_of().is_empty() || !goal.removable() {
            continue;
        }
        let artefact = goal.artefact();
        let Some(removable) = artefact.as_removable() else {
            continue;
        };
        match removable.exists(prj) {
            Ok(true) => {}
            Ok(false) | Err(_) => continue,
        }
        let gtr = tr.push_goal(&goal);
        gtr.remove_artefact(&goal);
        if !dry_run {
            if let Err(err) = removable.remove(prj) {
                gtr.warn(&err.to_string());
            }
        }
    }
    tr.done_project(prj, "cleaning", start.elapsed());
    Ok(())
}
