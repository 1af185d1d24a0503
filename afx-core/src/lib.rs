// afx-core/src/lib.rs
//! Reconciliation, package lifecycles and the concurrent executor for afx.

pub mod check;
pub mod context;
pub mod env;
pub mod init;
pub mod install;
pub mod pipeline;
pub mod release;
pub mod state;
pub mod template;
pub mod uninstall;

pub use context::InstallContext;
pub use pipeline::{after_run, dispatch, Executor, MAX_CONCURRENCY};
pub use state::{ChangeSets, State};
