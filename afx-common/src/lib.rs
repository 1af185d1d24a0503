// afx-common/src/lib.rs
pub mod config;
pub mod error;
pub mod manifest;
pub mod model;
pub mod pipeline;

pub use config::Config;
pub use error::{AfxError, ErrorList, Result};
pub use model::{Package, PackageKind, PackageType, Resource};
pub use pipeline::{Operation, Outcome, Status};
