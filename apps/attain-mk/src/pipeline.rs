// pipeline.rs — The demo project graph: README and rendered docs in dist/.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use attain_core::{Abstract, Project, UpdateMode};
use attain_exec::{ConvertCmd, OutputArg};
use attain_fs::{Copy, DirList, File, NameMatch};

/// Defines the project graph below `root`:
///
/// - `README.md` is copied to `dist/README.md`
/// - every `doc/*.md` renders to `dist/doc/*.html` via `markdown`
/// - the abstract `doc` goal groups the rendered pages
///
/// All produced artefacts are removable, so `--clean` undoes the build.
pub fn define(root: &Path) -> Result<Arc<Project>> {
    let prj = Project::new(root);

    let readme = prj.goal(File::new("README.md"))?;
    let dist_readme = prj.goal(File::new("dist/README.md"))?;
    dist_readme.set_removable(true);
    prj.new_action(
        &[readme],
        &[dist_readme],
        Some(Arc::new(Copy { make_dirs: true })),
    )?;

    let doc = prj.goal(Abstract::new("doc"))?;
    doc.set_update_mode(UpdateMode::ALL_ACTIONS | UpdateMode::UNORDERED);

    if prj.abs_path("doc")?.is_dir() {
        let sources = DirList::new("doc").with_filter(NameMatch::new("*.md")?);
        let mut pages = Vec::new();
        for src in sources.list(&prj)? {
            let page = File::new(Path::new("dist").join(&src)).with_ext("html");
            let src_goal = prj.goal(File::new(src))?;
            let page_goal = prj.goal(page)?;
            page_goal.set_removable(true);
            prj.new_action(
                &[src_goal],
                &[page_goal.clone()],
                Some(Arc::new(ConvertCmd::new("markdown", OutputArg::Stdout))),
            )?;
            pages.push(page_goal);
        }
        if !pages.is_empty() {
            prj.new_action(&pages, &[doc], None)?;
        }
    }

    Ok(prj)
}
