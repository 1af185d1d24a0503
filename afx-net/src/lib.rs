// afx-net/src/lib.rs
pub mod github;
pub mod http;
pub mod validation;

pub use github::{GitHubClient, Release, ReleaseAsset};
pub use http::{build_http_client, download_file};
pub use validation::validate_url;
