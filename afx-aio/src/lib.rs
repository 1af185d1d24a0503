// afx-aio/src/lib.rs
//! Blocking and async IO primitives for afx (filesystem, archives, processes, git, json).

pub mod extract;
pub mod fs;
pub mod git2;
pub mod json_io;
pub mod process;

pub use extract::{unarchive, ArchiveFormat, Unarchived};
pub use json_io::{read_json, write_json};
pub use process::run_build_step;
