//! # attain-exec
//!
//! Operations that run external commands for attain actions.
//!
//! ## Key components
//!
//! - [`CmdOp`] — one command with working directory, arguments, optional
//!   file redirections and the environment snapshot of the action's [`Env`]
//! - [`PipeOp`] — a pipeline of commands connected stdout to stdin
//! - [`ConvertCmd`] — converts one premise file into one result file, with
//!   configurable placement of the output file argument
//!
//! Command output that is not redirected to a file is pumped into the
//! environment's streams, so the engine's prefix writers tag every line.

pub mod cmd;
pub mod convert;
pub mod error;
pub mod pipe;

pub use cmd::CmdOp;
pub use convert::{ConvertCmd, OutputArg};
pub use error::ExecError;
pub use pipe::PipeOp;
