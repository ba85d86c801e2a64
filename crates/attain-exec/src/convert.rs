// convert.rs — One-premise-file to one-result-file converter command.

use std::sync::Arc;

use attain_core::{Action, Artefact, BuildError, Env, Operation, Trace};
use attain_fs::File;
use sha2::{Digest, Sha256};

use crate::cmd::CmdOp;
use crate::error::ExecError;

/// Where the converter expects the result file.
#[derive(Clone, Debug)]
pub enum OutputArg {
    /// The result path goes between the fixed arguments and the input path.
    AfterArgs,
    /// The result path is the last argument, after the input path.
    LastArg,
    /// The converter writes the result to stdout.
    Stdout,
    /// The result path follows this flag, e.g. `-o`.
    Flag(String),
}

/// Adapts a converter executable (markdown renderer, image transcoder, …)
/// as an operation turning exactly one premise file into one result file.
#[derive(Clone, Debug)]
pub struct ConvertCmd {
    exe: String,
    output: OutputArg,
    args: Vec<String>,
}

impl ConvertCmd {
    pub fn new(exe: impl Into<String>, output: OutputArg) -> Self {
        ConvertCmd {
            exe: exe.into(),
            output,
            args: Vec::new(),
        }
    }

    pub fn args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn files(&self, action: &Action) -> Result<(File, File), BuildError> {
        let (premises, results) = (action.premises(), action.results());
        if premises.len() != 1 || results.len() != 1 {
            return Err(ExecError::BadConvert {
                detail: format!("{} premises, {} results", premises.len(), results.len()),
            }
            .into());
        }
        let input = premises[0]
            .artefact()
            .as_any()
            .downcast_ref::<File>()
            .cloned()
            .ok_or_else(|| ExecError::BadConvert {
                detail: format!("premise of kind {}", premises[0].kind()),
            })?;
        let output = results[0]
            .artefact()
            .as_any()
            .downcast_ref::<File>()
            .cloned()
            .ok_or_else(|| ExecError::BadConvert {
                detail: format!("result of kind {}", results[0].kind()),
            })?;
        Ok((input, output))
    }

    fn command(&self, action: &Action) -> Result<CmdOp, BuildError> {
        let (input, output) = self.files(action)?;
        let in_path = input.path().to_string_lossy().into_owned();
        let out_path = output.path().to_string_lossy().into_owned();
        let mut op = CmdOp::new(&self.exe).args(self.args.iter().cloned()).described(
            format!(
                "{}: {} -> {}",
                self.exe, in_path, out_path
            ),
        );
        match &self.output {
            OutputArg::AfterArgs => {
                op = op.arg(&out_path).arg(&in_path);
            }
            OutputArg::LastArg => {
                op = op.arg(&in_path).arg(&out_path);
            }
            OutputArg::Stdout => {
                op = op.arg(&in_path).out_file(output.path());
            }
            OutputArg::Flag(flag) => {
                op = op.arg(flag).arg(&out_path).arg(&in_path);
            }
        }
        Ok(op)
    }
}

impl Operation for ConvertCmd {
    fn describe(&self, action: Option<&Action>, env: Option<&Env>) -> String {
        if let Some(action) = action {
            if let Ok(op) = self.command(action) {
                return op.describe(Some(action), env);
            }
        }
        format!("{}-convert", self.exe)
    }

    fn perform(&self, tr: &Trace, action: &Action, env: &Arc<Env>) -> Result<(), BuildError> {
        self.command(action)?.perform(tr, action, env)
    }

    fn write_hash(
        &self,
        hash: &mut Sha256,
        _action: &Action,
        _env: &Arc<Env>,
    ) -> Result<bool, BuildError> {
        hash.update(&self.exe);
        hash.update("\n");
        for arg in &self.args {
            hash.update(arg);
            hash.update("\n");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use attain_core::{NopTracer, Project};
    use tempfile::tempdir;

    #[test]
    #[cfg(unix)]
    fn stdout_placement_redirects_into_the_result_file() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("in.txt"), "payload\n").unwrap();
        let prj = Project::new(tmp.path());
        let src = prj.goal(File::new("in.txt")).unwrap();
        let dst = prj.goal(File::new("out.txt")).unwrap();
        let conv = ConvertCmd::new("/bin/cat", OutputArg::Stdout);
        let act = prj
            .new_action(&[src], &[dst], Some(Arc::new(conv.clone())))
            .unwrap();

        let env = Arc::new(Env::new());
        let tr = Trace::new(Arc::new(NopTracer));
        conv.perform(&tr, &act, &env).unwrap();
        assert_eq!(
            fs::read_to_string(tmp.path().join("out.txt")).unwrap(),
            "payload\n"
        );
    }

    #[test]
    fn convert_requires_single_file_premise_and_result() {
        let tmp = tempdir().unwrap();
        let prj = Project::new(tmp.path());
        let a = prj.goal(File::new("a")).unwrap();
        let b = prj.goal(File::new("b")).unwrap();
        let dst = prj.goal(File::new("out")).unwrap();
        let conv = ConvertCmd::new("cc", OutputArg::LastArg);
        let act = prj
            .new_action(&[a, b], &[dst], Some(Arc::new(conv.clone())))
            .unwrap();
        let env = Arc::new(Env::new());
        let tr = Trace::new(Arc::new(NopTracer));
        let err = conv.perform(&tr, &act, &env).unwrap_err();
        assert!(err.to_string().contains("one premise file"));
    }
}
