// afx-common/src/pipeline.rs
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle operation dispatched by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Install,
    Update,
    Check,
    Uninstall,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Install => "install",
            Operation::Update => "update",
            Operation::Check => "check",
            Operation::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress event for a single package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub name: String,
    pub done: bool,
    pub err: bool,
    pub message: String,
    /// Message is printed as is, without dimming.
    pub no_color: bool,
    /// Counts toward completion but is never printed.
    pub hidden: bool,
}

impl Status {
    pub fn success(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failure(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: true,
            err: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn hidden(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: true,
            hidden: true,
            ..Default::default()
        }
    }
}

/// What a successful operation reports on its progress line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub message: String,
    pub no_color: bool,
    pub hidden: bool,
}

impl Outcome {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// A message rendered without dimming, used for highlighted results.
    pub fn highlighted(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            no_color: true,
            hidden: false,
        }
    }

    pub fn hidden() -> Self {
        Self {
            hidden: true,
            ..Default::default()
        }
    }

    pub fn into_status(self, name: &str) -> Status {
        Status {
            name: name.to_string(),
            done: true,
            err: false,
            message: self.message,
            no_color: self.no_color,
            hidden: self.hidden,
        }
    }
}
