// cmd.rs — Single external command operation.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, OnceLock};
use std::thread;

use attain_core::{Action, BuildError, Env, Operation, Trace};
use sha2::{Digest, Sha256};

use crate::error::ExecError;

/// Runs one external command. The working directory defaults to the
/// project root; `in_file`/`out_file` redirect the command's stdin and
/// stdout to files, otherwise output is pumped into the environment's
/// streams where the engine's prefix writers tag it.
#[derive(Clone, Debug, Default)]
pub struct CmdOp {
    cwd: Option<PathBuf>,
    exe: String,
    args: Vec<String>,
    in_file: Option<PathBuf>,
    out_file: Option<PathBuf>,
    desc: OnceLock<String>,
}

impl CmdOp {
    pub fn new(exe: impl Into<String>) -> Self {
        CmdOp {
            exe: exe.into(),
            ..CmdOp::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Working directory, project-relative; defaults to the project root.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn in_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.in_file = Some(path.into());
        self
    }

    pub fn out_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.out_file = Some(path.into());
        self
    }

    pub fn described(self, desc: impl Into<String>) -> Self {
        let _ = self.desc.set(desc.into());
        self
    }

    pub(crate) fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.exe.clone()
        } else {
            format!("{} {}", self.exe, self.args.join(" "))
        }
    }

    /// The command with exe, args and working directory applied; stdio and
    /// environment wiring is left to the caller.
    pub(crate) fn build_command(&self, action: &Action) -> Result<Command, BuildError> {
        let mut cmd = Command::new(&self.exe);
        cmd.args(&self.args);
        let cwd = match &self.cwd {
            Some(dir) => action.project().abs_path(dir)?,
            None => action.project().abs_dir()?,
        };
        cmd.current_dir(cwd);
        Ok(cmd)
    }

    pub(crate) fn apply_env(&self, tr: &Trace, env: &Arc<Env>, cmd: &mut Command) {
        let snapshot = match env.exec_env() {
            Ok(entries) => entries,
            Err(err) => {
                tr.warn(&err.to_string());
                env.exec_env_lossy()
            }
        };
        // an empty snapshot inherits the process environment
        if snapshot.is_empty() {
            return;
        }
        cmd.env_clear();
        for entry in &snapshot {
            if let Some((key, val)) = entry.split_once('=') {
                cmd.env(key, val);
            }
        }
    }

    pub(crate) fn open_stdin(&self, action: &Action) -> Result<Stdio, BuildError> {
        match &self.in_file {
            Some(path) => {
                let abs = action.project().abs_path(path)?;
                let file = fs::File::open(&abs).map_err(|e| ExecError::io(abs, e))?;
                Ok(Stdio::from(file))
            }
            None => Ok(Stdio::inherit()),
        }
    }

    pub(crate) fn create_stdout(&self, action: &Action) -> Result<Option<Stdio>, BuildError> {
        match &self.out_file {
            Some(path) => {
                let abs = action.project().abs_path(path)?;
                if let Some(parent) = abs.parent() {
                    fs::create_dir_all(parent).map_err(|e| ExecError::io(parent, e))?;
                }
                let file = fs::File::create(&abs).map_err(|e| ExecError::io(abs, e))?;
                Ok(Some(Stdio::from(file)))
            }
            None => Ok(None),
        }
    }
}

impl Operation for CmdOp {
    fn describe(&self, _action: Option<&Action>, _env: Option<&Env>) -> String {
        self.desc
            .get_or_init(|| {
                let base = PathBuf::from(&self.exe);
                let base = base
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| self.exe.clone());
                format!("{}${}", base, self.args.join(" "))
            })
            .clone()
    }

    fn perform(&self, tr: &Trace, action: &Action, env: &Arc<Env>) -> Result<(), BuildError> {
        tr.check_cancelled()?;
        let mut cmd = self.build_command(action)?;
        self.apply_env(tr, env, &mut cmd);
        cmd.stdin(self.open_stdin(action)?);
        match self.create_stdout(action)? {
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
        if env.err.is_some() {
            cmd.stderr(Stdio::piped());
        } else {
            cmd.stderr(Stdio::inherit());
        }

        tracing::debug!(cmd = %self.command_line(), "exec");
        let mut child = cmd.spawn().map_err(|e| ExecError::Spawn {
            cmd: self.command_line(),
            source: e,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let status = thread::scope(|s| {
            if let (Some(mut pipe), Some(out)) = (stdout, env.out.clone()) {
                let mut out = out;
                s.spawn(move || {
                    let _ = io::copy(&mut pipe, &mut out);
                });
            }
            if let (Some(mut pipe), Some(err)) = (stderr, env.err.clone()) {
                let mut err = err;
                s.spawn(move || {
                    let _ = io::copy(&mut pipe, &mut err);
                });
            }
            child.wait()
        })
        .map_err(|e| ExecError::io(&self.exe, e))?;

        if !status.success() {
            tracing::error!(cmd = %self.command_line(), %status, "exec failed");
            return Err(ExecError::Status {
                cmd: self.command_line(),
                status,
            }
            .into());
        }
        Ok(())
    }

    fn write_hash(
        &self,
        hash: &mut Sha256,
        _action: &Action,
        _env: &Arc<Env>,
    ) -> Result<bool, BuildError> {
        if let Some(cwd) = &self.cwd {
            hash.update(cwd.to_string_lossy().as_bytes());
        }
        hash.update("\n");
        hash.update(&self.exe);
        hash.update("\n");
        for arg in &self.args {
            hash.update(arg);
            hash.update("\n");
        }
        if let Some(path) = &self.in_file {
            hash.update(path.to_string_lossy().as_bytes());
        }
        hash.update("\n");
        if let Some(path) = &self.out_file {
            hash.update(path.to_string_lossy().as_bytes());
        }
        hash.update("\n");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    use attain_core::{Abstract, NopTracer, PrefixWriter, Project, SharedWriter};
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

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

    fn fixture() -> (tempfile::TempDir, Arc<Project>, Action, Trace) {
        let tmp = tempdir().unwrap();
        let prj = Project::new(tmp.path());
        let goal = prj.goal(Abstract::new("out")).unwrap();
        let act = prj
            .new_action(&[], &[goal], Some(Arc::new(CmdOp::new("true"))))
            .unwrap();
        let tr = Trace::new(Arc::new(NopTracer));
        (tmp, prj, act, tr)
    }

    #[test]
    fn describe_uses_the_executable_base_name() {
        let op = CmdOp::new("/usr/bin/markdown").arg("-x");
        assert_eq!(op.describe(None, None), "markdown$-x");
    }

    #[test]
    #[cfg(unix)]
    fn output_is_pumped_into_the_env_stream() {
        let (_tmp, _prj, act, tr) = fixture();
        let sink = Sink::default();
        let mut env = Env::new();
        env.out = Some(SharedWriter::new(sink.clone()));
        let env = Arc::new(env);

        let op = CmdOp::new("/bin/sh").args(["-c", "printf 'one\\ntwo\\n'"]);
        op.perform(&tr, &act, &env).unwrap();
        assert_eq!(sink.text(), "one\ntwo\n");
    }

    #[test]
    #[cfg(unix)]
    fn prefixed_env_stream_tags_every_line() {
        let (_tmp, _prj, act, tr) = fixture();
        let sink = Sink::default();
        let mut env = Env::new();
        env.out = Some(SharedWriter::new(PrefixWriter::new(
            sink.clone(),
            b"3@[7] Out: ".to_vec(),
        )));
        let env = Arc::new(env);

        let op = CmdOp::new("/bin/sh").args(["-c", "printf 'a\\nb\\n'"]);
        op.perform(&tr, &act, &env).unwrap();
        assert_eq!(sink.text(), "3@[7] Out: a\n3@[7] Out: b\n");
    }

    #[test]
    #[cfg(unix)]
    fn failing_command_reports_its_status() {
        let (_tmp, _prj, act, tr) = fixture();
        let env = Arc::new(Env::new());
        let op = CmdOp::new("/bin/sh").args(["-c", "exit 3"]);
        let err = op.perform(&tr, &act, &env).unwrap_err();
        assert!(err.to_string().contains("failed"));
    }

    #[test]
    #[cfg(unix)]
    fn out_file_redirects_instead_of_the_stream() {
        let (tmp, _prj, act, tr) = fixture();
        let sink = Sink::default();
        let mut env = Env::new();
        env.out = Some(SharedWriter::new(sink.clone()));
        let env = Arc::new(env);

        let op = CmdOp::new("/bin/sh")
            .args(["-c", "printf captured"])
            .out_file("result.txt");
        op.perform(&tr, &act, &env).unwrap();
        assert_eq!(
            fs::read_to_string(tmp.path().join("result.txt")).unwrap(),
            "captured"
        );
        assert_eq!(sink.text(), "");
    }

    #[test]
    #[cfg(unix)]
    fn env_tags_reach_the_command() {
        let (_tmp, _prj, act, tr) = fixture();
        let sink = Sink::default();
        let mut env = Env::new();
        env.out = Some(SharedWriter::new(sink.clone()));
        env.set_tag("ATTAIN_TEST_TAG", "tagged");
        let env = Arc::new(env);

        let op = CmdOp::new("/bin/sh").args(["-c", "printf \"$ATTAIN_TEST_TAG\""]);
        op.perform(&tr, &act, &env).unwrap();
        assert_eq!(sink.text(), "tagged");
    }
}
