//! # attain-fs
//!
//! Filesystem artefacts and operations for attain projects.
//!
//! ## Key components
//!
//! - [`File`] — a single file, stated by its modification time
//! - [`DirList`] / [`DirTree`] — the filtered entries of a directory,
//!   non-recursive and recursive; stated by the newest matching entry
//! - [`Mirror`] — maps an origin directory onto a destination, optionally
//!   translating file extensions
//! - [`Filter`] — composable entry predicate with glob name matching,
//!   kind/mode/depth checks and subtree pruning
//! - [`Copy`] — operation copying filesystem premises into each result

pub mod copy;
pub mod dir;
pub mod error;
pub mod file;
pub mod filter;
pub mod mirror;

pub use copy::Copy;
pub use dir::{dir_files, Dir, DirList, DirTree};
pub use error::FsError;
pub use file::File;
pub use filter::{AllOf, AnyOf, Decision, Exts, Filter, IsDir, MaxDepth, ModeMask, NameMatch, Not, SkipNames, SkipPaths};
pub use mirror::Mirror;
