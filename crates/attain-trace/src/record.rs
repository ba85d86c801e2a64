// record.rs — Event recording tracer for tests.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use attain_core::{Action, Goal, Project, Trace, Tracer};

/// Records every event as one rendered line, for assertions in tests.
#[derive(Default)]
pub struct RecordingTracer {
    events: Mutex<Vec<String>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        RecordingTracer::default()
    }

    /// The recorded events, oldest first.
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The recorded events whose line starts with `prefix`.
    pub fn events_of(&self, prefix: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }

    fn push(&self, event: String) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl Tracer for RecordingTracer {
    fn debug(&self, _t: &Trace, msg: &str) {
        self.push(format!("debug {msg}"));
    }

    fn info(&self, _t: &Trace, msg: &str) {
        self.push(format!("info {msg}"));
    }

    fn warn(&self, _t: &Trace, msg: &str) {
        self.push(format!("warn {msg}"));
    }

    fn start_project(&self, _t: &Trace, prj: &Project, activity: &str) {
        self.push(format!("start-project {prj} {activity}"));
    }

    fn done_project(&self, _t: &Trace, prj: &Project, activity: &str, _took: Duration) {
        self.push(format!("done-project {prj} {activity}"));
    }

    fn run_action(&self, _t: &Trace, act: &Action) {
        self.push(format!("run-action {act}"));
    }

    fn run_implicit_action(&self, _t: &Trace, _act: &Action) {
        self.push("run-implicit-action".to_string());
    }

    fn schedule_res_time_zero(&self, _t: &Trace, act: &Action, res: &Goal) {
        self.push(format!("schedule-res-time-zero {act} {res}"));
    }

    fn schedule_not_premises(&self, _t: &Trace, act: &Action, res: &Goal) {
        self.push(format!("schedule-not-premises {act} {res}"));
    }

    fn schedule_pre_time_zero(&self, _t: &Trace, act: &Action, res: &Goal, pre: &Goal) {
        self.push(format!("schedule-pre-time-zero {act} {res} {pre}"));
    }

    fn schedule_outdated(&self, _t: &Trace, act: &Action, res: &Goal, pre: &Goal) {
        self.push(format!("schedule-outdated {act} {res} {pre}"));
    }

    fn check_goal(&self, _t: &Trace, goal: &Goal) {
        self.push(format!("check-goal {goal}"));
    }

    fn goal_up_to_date(&self, _t: &Trace, goal: &Goal) {
        self.push(format!("goal-up-to-date {goal}"));
    }

    fn goal_needs_actions(&self, _t: &Trace, goal: &Goal, n: usize) {
        self.push(format!("goal-needs-actions {goal} {n}"));
    }

    fn remove_artefact(&self, _t: &Trace, goal: &Goal) {
        self.push(format!("remove-artefact {goal}"));
    }
}
