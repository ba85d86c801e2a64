// change_flow.rs — Downstream propagation through premise-of edges.

use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use attain_core::{
    Action, Artefact, ArtefactKey, BuildError, Builder, Changer, Env, NopTracer, Operation,
    Project, Trace,
};

struct Stamp {
    name: String,
    state: Mutex<Option<SystemTime>>,
}

impl Stamp {
    fn at(name: &str, t: SystemTime) -> Arc<Stamp> {
        Arc::new(Stamp {
            name: name.to_string(),
            state: Mutex::new(Some(t)),
        })
    }

    fn set_state(&self, t: SystemTime) {
        *self.state.lock().unwrap() = Some(t);
    }
}

impl Artefact for Stamp {
    fn key(&self) -> ArtefactKey {
        ArtefactKey::new(self.name.clone())
    }

    fn kind(&self) -> &'static str {
        "stamp"
    }

    fn name(&self, _in_prj: &Project) -> String {
        self.name.clone()
    }

    fn state_at(&self, _in_prj: &Project) -> Result<Option<SystemTime>, BuildError> {
        Ok(*self.state.lock().unwrap())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct RecordingOp {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    freshens: Arc<Stamp>,
}

impl Operation for RecordingOp {
    fn describe(&self, _action: Option<&Action>, _env: Option<&Env>) -> String {
        self.name.clone()
    }

    fn perform(&self, _trace: &Trace, _action: &Action, _env: &Arc<Env>) -> Result<(), BuildError> {
        self.log.lock().unwrap().push(self.name.clone());
        self.freshens.set_state(SystemTime::now());
        Ok(())
    }
}

/// Two chains sharing one project:
///
///   src --op_mid--> mid --op_sink--> sink
///   other --op_other--> other_out
///
/// Changing `src` must rebuild exactly `mid` then `sink`.
#[test]
fn changer_rebuilds_the_downstream_closure_in_premise_first_order() {
    let t0 = SystemTime::now() - Duration::from_secs(3600);
    let prj = Project::new("");
    let log = Arc::new(Mutex::new(Vec::new()));

    let src = Stamp::at("src", t0);
    let mid = Stamp::at("mid", t0);
    let sink = Stamp::at("sink", t0);
    let other = Stamp::at("other", t0);
    let other_out = Stamp::at("other_out", t0);

    let g_src = prj.goal_arc(src.clone()).unwrap();
    let g_mid = prj.goal_arc(mid.clone()).unwrap();
    let g_sink = prj.goal_arc(sink.clone()).unwrap();
    let g_other = prj.goal_arc(other.clone()).unwrap();
    let g_other_out = prj.goal_arc(other_out.clone()).unwrap();

    let op = |name: &str, freshens: &Arc<Stamp>| -> Arc<dyn Operation> {
        Arc::new(RecordingOp {
            name: name.to_string(),
            log: log.clone(),
            freshens: freshens.clone(),
        })
    };
    prj.new_action(&[g_src.clone()], &[g_mid.clone()], Some(op("op_mid", &mid)))
        .unwrap();
    prj.new_action(&[g_mid], &[g_sink], Some(op("op_sink", &sink)))
        .unwrap();
    prj.new_action(&[g_other], &[g_other_out], Some(op("op_other", &other_out)))
        .unwrap();

    // first full build brings everything up to date
    let tr = Trace::new(Arc::new(NopTracer));
    let builder = Builder::new().with_env(Arc::new(Env::new()));
    builder.project(&prj, &tr).unwrap();
    log.lock().unwrap().clear();

    // change the source and propagate from its goal
    src.set_state(SystemTime::now());
    let changer = Changer::new().with_env(Arc::new(Env::new()));
    changer.goals(&tr, &[g_src]).unwrap();

    assert_eq!(*log.lock().unwrap(), ["op_mid", "op_sink"]);
}

#[test]
fn changer_with_up_to_date_goal_runs_nothing() {
    let t0 = SystemTime::now() - Duration::from_secs(3600);
    let prj = Project::new("");
    let log = Arc::new(Mutex::new(Vec::new()));
    let src = Stamp::at("src", t0);
    let out = Stamp::at("out", t0 + Duration::from_secs(1));
    let g_src = prj.goal_arc(src.clone()).unwrap();
    let g_out = prj.goal_arc(out.clone()).unwrap();
    prj.new_action(
        &[g_src.clone()],
        &[g_out],
        Some(Arc::new(RecordingOp {
            name: "op_out".to_string(),
            log: log.clone(),
            freshens: out.clone(),
        })),
    )
    .unwrap();

    let tr = Trace::new(Arc::new(NopTracer));
    let changer = Changer::new().with_env(Arc::new(Env::new()));
    changer.goals(&tr, &[g_src]).unwrap();
    assert_eq!(*log.lock().unwrap(), Vec::<String>::new());
}
