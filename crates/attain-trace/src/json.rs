// json.rs — Structured trace events appended as JSON lines.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use attain_core::{Action, Goal, Project, Trace, Tracer};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why an action was scheduled by the pre-time check.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleReason {
    ResultTimeZero,
    NoPremises,
    PremiseTimeZero,
    PremiseNewer,
}

/// One trace event as written to the JSONL sink.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    StartProject {
        build: u64,
        tag: String,
        project: String,
        activity: String,
        timestamp: DateTime<Utc>,
    },
    DoneProject {
        build: u64,
        tag: String,
        project: String,
        activity: String,
        millis: u64,
        timestamp: DateTime<Utc>,
    },
    RunAction {
        build: u64,
        tag: String,
        action: String,
        timestamp: DateTime<Utc>,
    },
    RunImplicitAction {
        build: u64,
        tag: String,
        timestamp: DateTime<Utc>,
    },
    Schedule {
        build: u64,
        tag: String,
        action: String,
        result: String,
        premise: Option<String>,
        reason: ScheduleReason,
        timestamp: DateTime<Utc>,
    },
    CheckGoal {
        build: u64,
        tag: String,
        goal: String,
        path: String,
        timestamp: DateTime<Utc>,
    },
    GoalUpToDate {
        build: u64,
        tag: String,
        goal: String,
        timestamp: DateTime<Utc>,
    },
    GoalNeedsActions {
        build: u64,
        tag: String,
        goal: String,
        actions: usize,
        timestamp: DateTime<Utc>,
    },
    RemoveArtefact {
        build: u64,
        tag: String,
        goal: String,
        timestamp: DateTime<Utc>,
    },
    Message {
        build: u64,
        tag: String,
        level: String,
        text: String,
        timestamp: DateTime<Utc>,
    },
}

/// Appends every trace event as one JSON line. Write errors are reported
/// through the ambient log and do not disturb the build.
pub struct JsonlTracer {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonlTracer {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        JsonlTracer {
            out: Mutex::new(Box::new(out)),
        }
    }

    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(JsonlTracer::new(file))
    }

    fn emit(&self, event: &TraceEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!("trace event serialization failed: {err}");
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writeln!(out, "{line}") {
            tracing::warn!("trace sink write failed: {err}");
        }
    }

    fn schedule(&self, t: &Trace, act: &Action, res: &Goal, pre: Option<&Goal>, reason: ScheduleReason) {
        self.emit(&TraceEvent::Schedule {
            build: t.build_id(),
            tag: t.top_tag(),
            action: act.to_string(),
            result: res.to_string(),
            premise: pre.map(Goal::to_string),
            reason,
            timestamp: Utc::now(),
        });
    }
}

impl Tracer for JsonlTracer {
    fn warn(&self, t: &Trace, msg: &str) {
        self.emit(&TraceEvent::Message {
            build: t.build_id(),
            tag: t.top_tag(),
            level: "warn".to_string(),
            text: msg.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn info(&self, t: &Trace, msg: &str) {
        self.emit(&TraceEvent::Message {
            build: t.build_id(),
            tag: t.top_tag(),
            level: "info".to_string(),
            text: msg.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn start_project(&self, t: &Trace, prj: &Project, activity: &str) {
        self.emit(&TraceEvent::StartProject {
            build: t.build_id(),
            tag: t.top_tag(),
            project: prj.label(),
            activity: activity.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn done_project(&self, t: &Trace, prj: &Project, activity: &str, took: Duration) {
        self.emit(&TraceEvent::DoneProject {
            build: t.build_id(),
            tag: t.top_tag(),
            project: prj.label(),
            activity: activity.to_string(),
            millis: took.as_millis() as u64,
            timestamp: Utc::now(),
        });
    }

    fn run_action(&self, t: &Trace, act: &Action) {
        self.emit(&TraceEvent::RunAction {
            build: t.build_id(),
            tag: t.top_tag(),
            action: act.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn run_implicit_action(&self, t: &Trace, _act: &Action) {
        self.emit(&TraceEvent::RunImplicitAction {
            build: t.build_id(),
            tag: t.top_tag(),
            timestamp: Utc::now(),
        });
    }

    fn schedule_res_time_zero(&self, t: &Trace, act: &Action, res: &Goal) {
        self.schedule(t, act, res, None, ScheduleReason::ResultTimeZero);
    }

    fn schedule_not_premises(&self, t: &Trace, act: &Action, res: &Goal) {
        self.schedule(t, act, res, None, ScheduleReason::NoPremises);
    }

    fn schedule_pre_time_zero(&self, t: &Trace, act: &Action, res: &Goal, pre: &Goal) {
        self.schedule(t, act, res, Some(pre), ScheduleReason::PremiseTimeZero);
    }

    fn schedule_outdated(&self, t: &Trace, act: &Action, res: &Goal, pre: &Goal) {
        self.schedule(t, act, res, Some(pre), ScheduleReason::PremiseNewer);
    }

    fn check_goal(&self, t: &Trace, goal: &Goal) {
        self.emit(&TraceEvent::CheckGoal {
            build: t.build_id(),
            tag: t.top_tag(),
            goal: goal.to_string(),
            path: t.path(),
            timestamp: Utc::now(),
        });
    }

    fn goal_up_to_date(&self, t: &Trace, goal: &Goal) {
        self.emit(&TraceEvent::GoalUpToDate {
            build: t.build_id(),
            tag: t.top_tag(),
            goal: goal.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn goal_needs_actions(&self, t: &Trace, goal: &Goal, n: usize) {
        self.emit(&TraceEvent::GoalNeedsActions {
            build: t.build_id(),
            tag: t.top_tag(),
            goal: goal.to_string(),
            actions: n,
            timestamp: Utc::now(),
        });
    }

    fn remove_artefact(&self, t: &Trace, goal: &Goal) {
        self.emit(&TraceEvent::RemoveArtefact {
            build: t.build_id(),
            tag: t.top_tag(),
            goal: goal.to_string(),
            timestamp: Utc::now(),
        });
    }
}
