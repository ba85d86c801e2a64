// write.rs — Levelled line-oriented tracer.
//
// Output format follows the pattern `{build}@{tag}\t<sigil> …` with one
// sigil per event kind: `{`/`}` bracket project activities, `?` checks a
// goal, `.` reports up-to-date, `!` reports work, and indented lines carry
// log messages.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use attain_core::{Action, Goal, Project, Trace, Tracer};

use crate::level::TraceLevel;

/// Writes trace events as tagged lines, filtered by a [`TraceLevel`].
pub struct WriteTracer {
    out: Mutex<Box<dyn Write + Send>>,
    level: TraceLevel,
}

impl WriteTracer {
    pub fn new(out: impl Write + Send + 'static, level: TraceLevel) -> Self {
        WriteTracer {
            out: Mutex::new(Box::new(out)),
            level,
        }
    }

    pub fn stderr(level: TraceLevel) -> Arc<WriteTracer> {
        Arc::new(WriteTracer::new(io::stderr(), level))
    }

    pub fn level(&self) -> TraceLevel {
        self.level
    }

    fn line(&self, t: &Trace, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{}@{}\t{}", t.build_id(), t.top_tag(), text);
    }
}

impl Tracer for WriteTracer {
    fn debug(&self, t: &Trace, msg: &str) {
        if self.level.traces(TraceLevel::DETAILS) {
            self.line(t, &format!("  DEBUG {msg}"));
        }
    }

    fn info(&self, t: &Trace, msg: &str) {
        if self.level.traces(TraceLevel::NORMAL) {
            self.line(t, &format!("  INFO  {msg}"));
        }
    }

    fn warn(&self, t: &Trace, msg: &str) {
        if self.level.traces(TraceLevel::IMPORTANT) {
            self.line(t, &format!("  WARN  {msg}"));
        }
    }

    fn start_project(&self, t: &Trace, prj: &Project, activity: &str) {
        if !self.level.is_nothing() {
            self.line(
                t,
                &format!(
                    "{{ {} project '{}' in {}",
                    activity,
                    prj,
                    prj.dir().display()
                ),
            );
        }
    }

    fn done_project(&self, t: &Trace, prj: &Project, activity: &str, took: Duration) {
        if !self.level.is_nothing() {
            self.line(t, &format!("}} {activity} project '{prj}' took {took:?}"));
        }
    }

    fn run_action(&self, t: &Trace, act: &Action) {
        if self.level.traces(TraceLevel::IMPORTANT) {
            self.line(t, &format!("  run action ({act})"));
        }
    }

    fn run_implicit_action(&self, t: &Trace, _act: &Action) {
        if self.level.traces(TraceLevel::DETAILS) {
            self.line(t, "  implicit action");
        }
    }

    fn schedule_res_time_zero(&self, t: &Trace, act: &Action, res: &Goal) {
        if self.level.traces(TraceLevel::NORMAL) {
            self.line(
                t,
                &format!("  schedule ({act}) for result [{res}] without state time"),
            );
        }
    }

    fn schedule_not_premises(&self, t: &Trace, act: &Action, res: &Goal) {
        if self.level.traces(TraceLevel::NORMAL) {
            self.line(
                t,
                &format!("  schedule ({act}) without premise for result [{res}]"),
            );
        }
    }

    fn schedule_pre_time_zero(&self, t: &Trace, act: &Action, res: &Goal, pre: &Goal) {
        if self.level.traces(TraceLevel::NORMAL) {
            self.line(
                t,
                &format!("  schedule ({act}) for result [{res}], premise [{pre}] has no state time"),
            );
        }
    }

    fn schedule_outdated(&self, t: &Trace, act: &Action, res: &Goal, pre: &Goal) {
        if self.level.traces(TraceLevel::NORMAL) {
            self.line(
                t,
                &format!("  schedule ({act}) for result [{res}], premise [{pre}] is newer"),
            );
        }
    }

    fn check_goal(&self, t: &Trace, goal: &Goal) {
        if self.level.traces(TraceLevel::IMPORTANT) {
            self.line(t, &format!("? [{goal}] {}", t.path()));
        }
    }

    fn goal_up_to_date(&self, t: &Trace, goal: &Goal) {
        if self.level.traces(TraceLevel::IMPORTANT) {
            self.line(t, &format!(". [{goal}] is up-to-date"));
        }
    }

    fn goal_needs_actions(&self, t: &Trace, goal: &Goal, n: usize) {
        if self.level.traces(TraceLevel::IMPORTANT) {
            self.line(t, &format!("! [{goal}] needs {n} actions"));
        }
    }

    fn remove_artefact(&self, t: &Trace, goal: &Goal) {
        if self.level.traces(TraceLevel::IMPORTANT) {
            self.line(t, &format!("! remove artefact [{goal}]"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use attain_core::{Abstract, Builder, Env, Project};

    #[derive(Clone, Default)]
    struct Sink(Arc<StdMutex<Vec<u8>>>);

    impl Sink {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn build_of_an_implicit_goal_traces_bracketed_activity() {
        let sink = Sink::default();
        let tracer = Arc::new(WriteTracer::new(sink.clone(), TraceLevel::MOST));
        let prj = Project::new("demo");
        let src = prj.goal(Abstract::new("src")).unwrap();
        let dst = prj.goal(Abstract::new("dst")).unwrap();
        prj.new_action(&[src], &[dst], None).unwrap();

        let tr = Trace::new(tracer);
        Builder::new()
            .with_env(Arc::new(Env::new()))
            .project(&prj, &tr)
            .unwrap();

        let text = sink.text();
        assert!(text.contains("{ building project 'demo'"), "got: {text}");
        assert!(text.contains("} building project 'demo'"), "got: {text}");
        assert!(text.contains("? [dst:abstract]"), "got: {text}");
        assert!(text.contains("needs 1 actions"), "got: {text}");
        assert!(text.contains("implicit action"), "got: {text}");
    }

    #[test]
    fn nothing_level_stays_silent() {
        let sink = Sink::default();
        let tracer = Arc::new(WriteTracer::new(sink.clone(), TraceLevel::NOTHING));
        let prj = Project::new("demo");
        prj.goal(Abstract::new("only")).unwrap();
        let tr = Trace::new(tracer);
        Builder::new()
            .with_env(Arc::new(Env::new()))
            .project(&prj, &tr)
            .unwrap();
        assert_eq!(sink.text(), "");
    }
}
