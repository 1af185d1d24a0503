// afx-core/src/pipeline/mod.rs
pub mod engine;

pub use engine::{after_run, dispatch, Executor, MAX_CONCURRENCY};
