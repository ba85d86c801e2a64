// fs_build.rs — Building and cleaning real files through the engine.
//
// Exercises the whole stack on a temp directory: a copy action driven by
// the builder, idempotence on unchanged inputs, and the cleaner's dry-run
// against real removal.

use std::fs;
use std::sync::Arc;

use attain_core::{clean, BuildError, Builder, Env, NopTracer, Project, Trace};
use attain_fs::{Copy, File};
use tempfile::tempdir;

fn builder() -> Builder {
    Builder::new().with_env(Arc::new(Env::new()))
}

fn trace() -> Trace {
    Trace::new(Arc::new(NopTracer))
}

#[test]
fn copy_build_is_idempotent_and_cleanable() {
    let tmp = tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("doc")).unwrap();
    fs::write(tmp.path().join("doc/foo.txt"), b"payload").unwrap();

    let prj = Project::new(tmp.path());
    let src = prj.goal(File::new("doc/foo.txt")).unwrap();
    let dst = prj.goal(File::new("doc/foo.cp")).unwrap();
    dst.set_removable(true);
    prj.new_action(&[src], &[dst.clone()], Some(Arc::new(Copy::default())))
        .unwrap();

    builder().project(&prj, &trace()).unwrap();
    let out = tmp.path().join("doc/foo.cp");
    assert_eq!(fs::read(&out).unwrap(), b"payload");

    // the copy is newer than its premise: the second build must not touch it
    let stamp = fs::metadata(&out).unwrap().modified().unwrap();
    builder().project(&prj, &trace()).unwrap();
    assert_eq!(fs::metadata(&out).unwrap().modified().unwrap(), stamp);

    // dry run only reports, the real run removes
    clean(&prj, true, &trace()).unwrap();
    assert!(out.exists());
    clean(&prj, false, &trace()).unwrap();
    assert!(!out.exists());

    // the source is not removable and must survive both passes
    assert!(tmp.path().join("doc/foo.txt").exists());
}

#[test]
fn copy_skips_abstract_results() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("a.txt"), b"a").unwrap();
    let prj = Project::new(tmp.path());
    let src = prj.goal(File::new("a.txt")).unwrap();
    let dst = prj.goal(attain_core::Abstract::new("dst")).unwrap();
    let sink = prj.goal(File::new("sink.txt")).unwrap();
    // abstract results are skipped, so this succeeds
    prj.new_action(&[src.clone()], &[dst, sink], Some(Arc::new(Copy::default())))
        .unwrap();
    builder().project(&prj, &trace()).unwrap();
    assert!(tmp.path().join("sink.txt").exists());
}

#[test]
fn missing_premise_makes_the_state_unknown_and_the_copy_fail() {
    let tmp = tempdir().unwrap();
    let prj = Project::new(tmp.path());
    let src = prj.goal(File::new("absent.txt")).unwrap();
    let dst = prj.goal(File::new("copy.txt")).unwrap();
    prj.new_action(&[src.clone()], &[dst], Some(Arc::new(Copy::default())))
        .unwrap();

    assert_eq!(src.state_at().unwrap(), None);
    let err = builder().project(&prj, &trace()).unwrap_err();
    assert!(matches!(err, BuildError::Io { .. }));
}
