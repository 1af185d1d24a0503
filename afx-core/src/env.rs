// afx-core/src/env.rs
//! Cached environment values and secrets, prompted for when missing.
//!
//! Values resolve as process environment, then the cache file, then the
//! registered default. Prompting happens once, before any concurrent work.
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use afx_aio::{fs as afx_fs, json_io};
use afx_common::error::{AfxError, Result};
use afx_common::Package;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const SUDO_PASSWORD: &str = "AFX_SUDO_PASSWORD";

/// The cache holds secrets.
const CACHE_FILE_MODE: u32 = 0o600;

/// How to ask for a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Input {
    pub when: bool,
    pub message: String,
    pub help: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub default: String,
    #[serde(skip)]
    pub input: Input,
}

impl Variable {
    fn resolved(&self) -> Option<&str> {
        [self.value.as_str(), self.default.as_str()]
            .into_iter()
            .find(|v| !v.is_empty())
    }
}

/// Source of interactive answers.
pub trait Prompter: Send + Sync {
    fn is_interactive(&self) -> bool;
    fn password(&self, message: &str, help: &str) -> Result<String>;
}

/// Prompts on the controlling terminal, hiding the typed characters.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    fn password(&self, message: &str, help: &str) -> Result<String> {
        let prompt = if help.is_empty() {
            message.to_string()
        } else {
            format!("{message} ({help})")
        };
        dialoguer::Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(|e| {
                debug!("Prompt aborted: {}", e);
                AfxError::Prompt("prompt cancelled".to_string())
            })
    }
}

pub struct Vault {
    path: PathBuf,
    vars: BTreeMap<String, Variable>,
    prompter: Box<dyn Prompter>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("path", &self.path)
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Vault {
    /// Opens the cache at `path`; an unreadable cache is discarded.
    pub fn load(path: &Path) -> Self {
        let vars = match json_io::read_json::<BTreeMap<String, Variable>>(path) {
            Ok(vars) => vars.unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring unreadable env cache {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        debug!("Loaded {} cached env entries", vars.len());
        Self {
            path: path.to_path_buf(),
            vars,
            prompter: Box::new(TerminalPrompter),
        }
    }

    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registers `key`, keeping the environment value over the cached one.
    pub fn add(&mut self, key: &str, default: &str, input: Input) {
        let cached = self.vars.remove(key).unwrap_or_default();
        let value = std::env::var(key)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(cached.value);
        let default = if default.is_empty() {
            cached.default
        } else {
            default.to_string()
        };
        self.vars.insert(
            key.to_string(),
            Variable {
                value,
                default,
                input,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).and_then(Variable::resolved)
    }

    /// Prompts for each of `keys` that is registered, wanted and still empty.
    pub fn ask(&mut self, keys: &[&str]) -> Result<()> {
        let wanted: BTreeMap<String, bool> = keys
            .iter()
            .filter_map(|k| self.vars.get(*k).map(|v| (k.to_string(), v.input.when)))
            .collect();
        self.ask_when(&wanted)
    }

    /// Prompts for every key whose flag is true and whose value is empty.
    pub fn ask_when(&mut self, wanted: &BTreeMap<String, bool>) -> Result<()> {
        let pending: Vec<String> = wanted
            .iter()
            .filter(|(key, when)| **when && self.get(key).is_none())
            .map(|(key, _)| key.clone())
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        if !self.prompter.is_interactive() {
            debug!("stdin is not a terminal, not prompting for {:?}", pending);
            return Ok(());
        }
        for key in pending {
            let Some(var) = self.vars.get_mut(&key) else {
                continue;
            };
            let message = if var.input.message.is_empty() {
                key.clone()
            } else {
                var.input.message.clone()
            };
            var.value = self.prompter.password(&message, &var.input.help)?;
        }
        Ok(())
    }

    /// Writes non-empty entries to the cache, readable by the owner only.
    pub fn save(&self) -> Result<()> {
        let kept: BTreeMap<&String, &Variable> = self
            .vars
            .iter()
            .filter(|(_, v)| !(v.value.is_empty() && v.default.is_empty()))
            .collect();
        json_io::write_json(&self.path, &kept, CACHE_FILE_MODE)?;
        debug!("Saved {} env entries to {}", kept.len(), self.path.display());
        Ok(())
    }

    /// Forgets every cached value so the next run asks again.
    pub fn refresh(&self) -> Result<()> {
        refresh_cache(&self.path)
    }
}

pub fn refresh_cache(path: &Path) -> Result<()> {
    debug!("Deleting env cache {}", path.display());
    afx_fs::remove_path(path)
}

/// Registers the variables the configured packages need.
pub fn register_defaults(vault: &mut Vault, packages: &[Package]) {
    let needs_token = packages.iter().any(|p| p.release().is_some());
    let needs_sudo = packages.iter().any(|p| {
        p.command()
            .map(|c| c.build_steps().iter().any(|s| s.split_whitespace().next() == Some("sudo")))
            .unwrap_or(false)
    });
    vault.add(
        GITHUB_TOKEN,
        "",
        Input {
            when: needs_token,
            message: "Please type your GITHUB_TOKEN".to_string(),
            help: "To fetch GitHub Releases, GitHub token is required".to_string(),
        },
    );
    vault.add(
        SUDO_PASSWORD,
        "",
        Input {
            when: needs_sudo,
            message: "Please enter sudo password".to_string(),
            help: "Build steps contain sudo commands".to_string(),
        },
    );
}
