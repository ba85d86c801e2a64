// pipe.rs — Pipeline of commands connected stdout to stdin.

use std::io;
use std::process::{Child, Stdio};
use std::sync::Arc;
use std::thread;

use attain_core::{Action, BuildError, Env, Operation, Trace};
use sha2::Sha256;

use crate::cmd::CmdOp;
use crate::error::ExecError;

/// Runs its stages as one pipeline: each stage's stdout feeds the next
/// stage's stdin. The first stage reads the pipe input, the last stage's
/// output goes to its `out_file` or the environment stream. Cancellation
/// is observed between stage launches.
#[derive(Clone, Debug, Default)]
pub struct PipeOp {
    stages: Vec<CmdOp>,
}

impl PipeOp {
    pub fn new(stages: impl IntoIterator<Item = CmdOp>) -> Self {
        PipeOp {
            stages: stages.into_iter().collect(),
        }
    }
}

impl Operation for PipeOp {
    fn describe(&self, action: Option<&Action>, env: Option<&Env>) -> String {
        if self.stages.is_empty() {
            return "empty pipe".to_string();
        }
        self.stages
            .iter()
            .map(|s| s.describe(action, env))
            .collect::<Vec<_>>()
            .join("|")
    }

    fn perform(&self, tr: &Trace, action: &Action, env: &Arc<Env>) -> Result<(), BuildError> {
        if self.stages.is_empty() {
            return Err(ExecError::EmptyPipe.into());
        }
        let last = self.stages.len() - 1;
        let mut children: Vec<Child> = Vec::with_capacity(self.stages.len());

        for (i, stage) in self.stages.iter().enumerate() {
            if let Err(err) = tr.check_cancelled() {
                kill_all(&mut children);
                return Err(err);
            }
            let mut cmd = stage.build_command(action)?;
            stage.apply_env(tr, env, &mut cmd);

            if i == 0 {
                cmd.stdin(stage.open_stdin(action)?);
            } else {
                let upstream = children[i - 1]
                    .stdout
                    .take()
                    .map(Stdio::from)
                    .unwrap_or_else(Stdio::null);
                cmd.stdin(upstream);
            }

            if i < last {
                cmd.stdout(Stdio::piped());
            } else {
                match stage.create_stdout(action)? {
                    Some(out) => {
                        cmd.stdout(out);
                    }
                    None if env.out.is_some() => {
                        cmd.stdout(Stdio::piped());
                    }
                    None => {
                        cmd.stdout(Stdio::inherit());
                    }
                }
            }
            if env.err.is_some() {
                cmd.stderr(Stdio::piped());
            } else {
                cmd.stderr(Stdio::inherit());
            }

            tracing::debug!(cmd = %stage.command_line(), stage = i, "pipe exec");
            match cmd.spawn() {
                Ok(child) => children.push(child),
                Err(err) => {
                    kill_all(&mut children);
                    return Err(ExecError::Spawn {
                        cmd: stage.command_line(),
                        source: err,
                    }
                    .into());
                }
            }
        }

        let last_stdout = children[last].stdout.take();
        let stderr_pipes: Vec<_> = children
            .iter_mut()
            .map(|child| child.stderr.take())
            .collect();

        let run = thread::scope(|s| -> Result<(), ExecError> {
            for pipe in stderr_pipes.into_iter().flatten() {
                if let Some(err_w) = env.err.clone() {
                    let mut pipe = pipe;
                    let mut err_w = err_w;
                    s.spawn(move || {
                        let _ = io::copy(&mut pipe, &mut err_w);
                    });
                }
            }
            if let (Some(pipe), Some(out_w)) = (last_stdout, env.out.clone()) {
                let mut pipe = pipe;
                let mut out_w = out_w;
                s.spawn(move || {
                    let _ = io::copy(&mut pipe, &mut out_w);
                });
            }
            for i in 0..children.len() {
                let status = children[i]
                    .wait()
                    .map_err(|e| ExecError::io(self.stages[i].command_line(), e))?;
                if !status.success() {
                    for straggler in &mut children[i + 1..] {
                        let _ = straggler.kill();
                        let _ = straggler.wait();
                    }
                    return Err(ExecError::Status {
                        cmd: self.stages[i].command_line(),
                        status,
                    });
                }
            }
            Ok(())
        });
        run.map_err(Into::into)
    }

    fn write_hash(
        &self,
        hash: &mut Sha256,
        action: &Action,
        env: &Arc<Env>,
    ) -> Result<bool, BuildError> {
        for stage in &self.stages {
            if !stage.write_hash(hash, action, env)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn kill_all(children: &mut [Child]) {
    for child in children {
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    use attain_core::{Abstract, NopTracer, Project, SharedWriter};
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

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
    fn describe_joins_the_stages() {
        let pipe = PipeOp::new([
            CmdOp::new("cat").arg("in.txt"),
            CmdOp::new("tr").args(["a-z", "A-Z"]),
        ]);
        assert_eq!(pipe.describe(None, None), "cat$in.txt|tr$a-z A-Z");
        assert_eq!(PipeOp::default().describe(None, None), "empty pipe");
    }

    #[test]
    #[cfg(unix)]
    fn stages_are_connected_stdout_to_stdin() {
        let tmp = tempdir().unwrap();
        let prj = Project::new(tmp.path());
        let goal = prj.goal(Abstract::new("out")).unwrap();
        let pipe = PipeOp::new([
            CmdOp::new("/bin/sh").args(["-c", "printf 'hello pipe\\n'"]),
            CmdOp::new("/usr/bin/tr").args(["a-z", "A-Z"]),
        ]);
        let act = prj
            .new_action(&[], &[goal], Some(Arc::new(pipe.clone())))
            .unwrap();

        let sink = Sink::default();
        let mut env = Env::new();
        env.out = Some(SharedWriter::new(sink.clone()));
        let env = Arc::new(env);
        let tr = Trace::new(Arc::new(NopTracer));
        pipe.perform(&tr, &act, &env).unwrap();
        assert_eq!(
            String::from_utf8_lossy(&sink.0.lock().unwrap()),
            "HELLO PIPE\n"
        );
    }

    #[test]
    #[cfg(unix)]
    fn failing_stage_fails_the_pipe() {
        let tmp = tempdir().unwrap();
        let prj = Project::new(tmp.path());
        let goal = prj.goal(Abstract::new("out")).unwrap();
        let pipe = PipeOp::new([
            CmdOp::new("/bin/sh").args(["-c", "exit 1"]),
            CmdOp::new("/bin/cat"),
        ]);
        let act = prj
            .new_action(&[], &[goal], Some(Arc::new(pipe.clone())))
            .unwrap();
        let env = Arc::new(Env::new());
        let tr = Trace::new(Arc::new(NopTracer));
        assert!(pipe.perform(&tr, &act, &env).is_err());
    }
}
