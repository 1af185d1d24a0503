// afx-common/src/error.rs
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AfxError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("YAML Parsing Error: {0}")]
    Yaml(#[from] Arc<serde_yaml::Error>),

    #[error("Git Error: {0}")]
    Git(#[from] Arc<git2::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("State Error: {0}")]
    State(String),

    #[error("Fetch Error: {0}")]
    Fetch(String),

    #[error("DownloadError: Failed to download '{0}' from '{1}': {2}")]
    Download(String, String, String),

    #[error("Build Error: {0}")]
    Build(String),

    #[error("Link Error: {0}")]
    Link(String),

    #[error("Asset Not Found: {0}")]
    AssetNotFound(String),

    #[error("Extract Error: {0}")]
    Extract(String),

    #[error("Template Error: {0}")]
    Template(String),

    #[error("API Error: {0}")]
    Api(String),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("{0}")]
    Prompt(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Generic(String),
}

impl AfxError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AfxError::Cancelled)
    }

    /// Prefixes the message with the package it belongs to.
    pub fn for_package(self, name: &str) -> Self {
        match self {
            AfxError::Cancelled => AfxError::Cancelled,
            other => AfxError::Generic(format!("{name}: {other}")),
        }
    }
}

impl From<std::io::Error> for AfxError {
    fn from(err: std::io::Error) -> Self {
        AfxError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for AfxError {
    fn from(err: reqwest::Error) -> Self {
        AfxError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for AfxError {
    fn from(err: serde_json::Error) -> Self {
        AfxError::Json(Arc::new(err))
    }
}

impl From<serde_yaml::Error> for AfxError {
    fn from(err: serde_yaml::Error) -> Self {
        AfxError::Yaml(Arc::new(err))
    }
}

impl From<git2::Error> for AfxError {
    fn from(err: git2::Error) -> Self {
        AfxError::Git(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, AfxError>;

/// Accumulates errors from independent operations.
///
/// Cancellation is kept at the front so callers see it as the first cause.
#[derive(Debug, Clone, Default)]
pub struct ErrorList {
    errors: Vec<AfxError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: AfxError) {
        if err.is_cancelled() {
            if !self.has_cancelled() {
                self.errors.insert(0, err);
            }
        } else {
            self.errors.push(err);
        }
    }

    pub fn extend(&mut self, other: ErrorList) {
        for err in other.errors {
            self.push(err);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[AfxError] {
        &self.errors
    }

    pub fn has_cancelled(&self) -> bool {
        self.errors.iter().any(AfxError::is_cancelled)
    }

    /// Collapses the list into a single error, keeping cancellation visible.
    pub fn into_error(self) -> Option<AfxError> {
        match self.errors.len() {
            0 => None,
            1 => self.errors.into_iter().next(),
            _ if self.has_cancelled() => Some(AfxError::Cancelled),
            _ => Some(AfxError::Generic(self.to_string())),
        }
    }

    pub fn into_result(self) -> std::result::Result<(), ErrorList> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => Ok(()),
            [only] => write!(f, "{only}"),
            many => {
                writeln!(f, "{} errors occurred:", many.len())?;
                for (i, err) in many.iter().enumerate() {
                    if i + 1 == many.len() {
                        write!(f, "{}. {}", i + 1, err)?;
                    } else {
                        writeln!(f, "{}. {}", i + 1, err)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ErrorList {}

impl From<AfxError> for ErrorList {
    fn from(err: AfxError) -> Self {
        let mut list = ErrorList::new();
        list.push(err);
        list
    }
}
