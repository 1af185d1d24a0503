// afx-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};

use directories::UserDirs;
use tracing::debug;

use super::error::{AfxError, Result};

const DEFAULT_ROOT_DIRNAME: &str = ".afx";
const STATE_FILENAME: &str = "state.json";
const CACHE_FILENAME: &str = "cache.json";
const GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub home_dir: PathBuf,
    pub afx_root: PathBuf,
    pub config_root: PathBuf,
    pub command_path: PathBuf,
    pub api_base_url: String,
    pub github_api_token: Option<String>,
    pub log_path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading afx configuration");

        let home_dir = env::var("HOME")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(|| UserDirs::new().map(|ud| ud.home_dir().to_path_buf()))
            .ok_or_else(|| AfxError::Config("Could not determine home directory".to_string()))?;

        let afx_root = path_from_env("AFX_ROOT", &home_dir)
            .unwrap_or_else(|| home_dir.join(DEFAULT_ROOT_DIRNAME));
        let config_root = path_from_env("AFX_CONFIG_ROOT", &home_dir)
            .unwrap_or_else(|| home_dir.join(".config").join("afx"));
        let command_path = path_from_env("AFX_COMMAND_PATH", &home_dir)
            .unwrap_or_else(|| home_dir.join("bin"));
        let log_path = path_from_env("AFX_LOG_PATH", &home_dir);
        let github_api_token = env::var("GITHUB_TOKEN").ok().filter(|s| !s.is_empty());

        debug!("Effective AFX_ROOT set to: {}", afx_root.display());
        debug!("Effective AFX_CONFIG_ROOT set to: {}", config_root.display());

        Ok(Self {
            home_dir,
            afx_root,
            config_root,
            command_path,
            api_base_url: GITHUB_API_URL.to_string(),
            github_api_token,
            log_path,
        })
    }

    /// Builds a configuration rooted at `root`, ignoring the environment.
    pub fn with_root(root: &Path) -> Self {
        Self {
            home_dir: root.to_path_buf(),
            afx_root: root.join(DEFAULT_ROOT_DIRNAME),
            config_root: root.join(".config").join("afx"),
            command_path: root.join("bin"),
            api_base_url: GITHUB_API_URL.to_string(),
            github_api_token: None,
            log_path: None,
        }
    }

    pub fn afx_root(&self) -> &Path {
        &self.afx_root
    }

    pub fn bin_dir(&self) -> &Path {
        &self.command_path
    }

    pub fn state_file(&self) -> PathBuf {
        self.afx_root.join(STATE_FILENAME)
    }

    pub fn cache_file(&self) -> PathBuf {
        self.afx_root.join(CACHE_FILENAME)
    }

    pub fn github_home(&self, owner: &str, repo: &str) -> PathBuf {
        self.afx_root.join("github.com").join(owner).join(repo)
    }

    pub fn gist_home(&self, owner: &str, id: &str) -> PathBuf {
        self.afx_root.join("gist.github.com").join(owner).join(id)
    }

    /// Expands `~` and environment variables in a user-supplied path.
    pub fn expand_path(&self, raw: &str) -> PathBuf {
        expand(raw, &self.home_dir)
    }
}

fn path_from_env(key: &str, home: &Path) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .map(|raw| expand(&raw, home))
}

fn expand(raw: &str, home: &Path) -> PathBuf {
    let home_str = home.to_string_lossy().to_string();
    let expanded = shellexpand::full_with_context_no_errors(
        raw,
        || Some(home_str.clone()),
        |var| env::var(var).ok(),
    );
    PathBuf::from(expanded.as_ref())
}

pub fn load_config() -> Result<Config> {
    Config::load()
}
