//! # attain-mk
//!
//! Demo build script driving an attain project: copies the top-level
//! README into `dist/` and renders every `doc/*.md` to `dist/doc/*.html`
//! (the markdown rendering needs a `markdown` executable in the path).
//!
//! - default invocation builds all leaf goals
//! - positional names restrict the build to the named goals
//! - `--clean` removes the removable artefacts, `-n` only reports them
//! - `--dot` prints the project graph for GraphViz and exits

mod pipeline;

use std::io;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use attain_core::{clean, Builder, Trace};
use attain_trace::{Diagrammer, TraceLevel, WriteTracer};

/// Build the demo project graph: docs into dist.
#[derive(Parser)]
#[command(name = "attain-mk", version, long_version = long_version(), about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Remove removable artefacts instead of building.
    #[arg(long)]
    clean: bool,

    /// With --clean: only report what would be removed.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Write the project graph as GraphViz DOT to stdout and exit.
    #[arg(long)]
    dot: bool,

    /// Trace verbosity: off, least, medium or most.
    #[arg(long, default_value = "least")]
    trace: TraceLevel,

    /// Goals to build; all leaf goals when empty.
    goals: Vec<String>,
}

/// Build the long version string: "0.1.0 (abc1234 2026-08-02)"
const fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("ATTAIN_GIT_HASH"),
        " ",
        env!("ATTAIN_BUILD_DATE"),
        ")"
    )
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let prj = pipeline::define(&cli.project_root)?;
    let tr = Trace::new(WriteTracer::stderr(cli.trace));

    if cli.dot {
        Diagrammer::default().write_dot(&mut io::stdout(), &prj)?;
        return Ok(());
    }
    if cli.clean {
        clean(&prj, cli.dry_run, &tr)?;
        return Ok(());
    }

    let builder = Builder::new();
    if cli.goals.is_empty() {
        builder.project(&prj, &tr)?;
    } else {
        let names: Vec<&str> = cli.goals.iter().map(String::as_str).collect();
        builder.named_goals(&prj, &tr, &names)?;
    }
    Ok(())
}
