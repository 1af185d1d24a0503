// afx-common/src/model/package.rs
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use super::resource::Resource;
use crate::config::Config;
use crate::error::{AfxError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plugin {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub load: Load,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Load {
    #[serde(default)]
    pub scripts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Command {
    #[serde(default)]
    pub build: Option<Build>,
    #[serde(default)]
    pub link: Vec<Link>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub alias: BTreeMap<String, String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

impl Command {
    pub fn build_steps(&self) -> &[String] {
        self.build.as_ref().map(|b| b.steps.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Build {
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// A symlink declaration. `from` is a glob relative to the package home.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Link {
    pub from: String,
    #[serde(default)]
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Release {
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub asset: Option<AssetFilter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetFilter {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub replacements: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloneOptions {
    #[serde(default)]
    pub depth: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitHub {
    pub name: String,
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub with: Option<CloneOptions>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub release: Option<Release>,
    #[serde(default)]
    pub plugin: Option<Plugin>,
    #[serde(default)]
    pub command: Option<Command>,
    #[serde(default, rename = "depends-on")]
    pub depends_on: Vec<String>,
}

impl GitHub {
    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }

    pub fn depth(&self) -> Option<u32> {
        self.with.as_ref().and_then(|w| w.depth).filter(|d| *d > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Gist {
    pub name: String,
    pub owner: String,
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub plugin: Option<Plugin>,
    #[serde(default)]
    pub command: Option<Command>,
    #[serde(default, rename = "depends-on")]
    pub depends_on: Vec<String>,
}

impl Gist {
    pub fn clone_url(&self) -> String {
        format!("https://gist.github.com/{}/{}", self.owner, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Http {
    pub name: String,
    pub url: String,
    /// Path, relative to the home, the download is written to.
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub plugin: Option<Plugin>,
    #[serde(default)]
    pub command: Option<Command>,
    #[serde(default, rename = "depends-on")]
    pub depends_on: Vec<String>,
}

impl Http {
    /// File name the download is written to.
    pub fn filename(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segments| segments.next_back().map(|s| s.to_string()))
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{}-download", self.name))
    }

    /// Where the download lands inside `home`: `output` when set, else the
    /// last URL segment.
    pub fn destination(&self, home: &Path) -> PathBuf {
        match self.output.as_deref().filter(|s| !s.is_empty()) {
            Some(output) => home.join(output),
            None => home.join(self.filename()),
        }
    }

    fn validate_output(&self) -> Result<()> {
        let Some(output) = self.output.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(());
        };
        let contained = !output.starts_with('~')
            && Path::new(output)
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(AfxError::Config(format!(
                "{}: output '{output}' must be a relative path inside the package home",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Local {
    pub name: String,
    pub directory: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub plugin: Option<Plugin>,
    #[serde(default)]
    pub command: Option<Command>,
    #[serde(default, rename = "depends-on")]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageKind {
    GitHub(GitHub),
    Gist(Gist),
    Http(Http),
    Local(Local),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageType {
    GitHub,
    GitHubRelease,
    Gist,
    Http,
    Local,
}

impl PackageType {
    pub fn label(&self) -> &'static str {
        match self {
            PackageType::GitHub => "GitHub",
            PackageType::GitHubRelease => "GitHub Release",
            PackageType::Gist => "Gist",
            PackageType::Http => "HTTP",
            PackageType::Local => "Local",
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A declared package with its on-disk locations resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub kind: PackageKind,
    home: PathBuf,
    bin_dir: PathBuf,
}

impl Package {
    pub fn new(kind: PackageKind, config: &Config) -> Result<Self> {
        let home = match &kind {
            PackageKind::GitHub(gh) => config.github_home(&gh.owner, &gh.repo),
            PackageKind::Gist(gist) => config.gist_home(&gist.owner, &gist.id),
            PackageKind::Http(http) => {
                http.validate_output()?;
                let url = Url::parse(&http.url).map_err(|e| {
                    AfxError::Config(format!("{}: invalid url '{}': {e}", http.name, http.url))
                })?;
                let host = url.host_str().ok_or_else(|| {
                    AfxError::Config(format!("{}: url '{}' has no host", http.name, http.url))
                })?;
                config.afx_root().join(host).join(&http.name)
            }
            PackageKind::Local(local) => config.expand_path(&local.directory),
        };
        Ok(Self {
            kind,
            home,
            bin_dir: config.bin_dir().to_path_buf(),
        })
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            PackageKind::GitHub(p) => &p.name,
            PackageKind::Gist(p) => &p.name,
            PackageKind::Http(p) => &p.name,
            PackageKind::Local(p) => &p.name,
        }
    }

    /// Stable identity, independent of the configured name.
    pub fn id(&self) -> String {
        match &self.kind {
            PackageKind::GitHub(gh) if gh.release.is_some() => {
                format!("github.com/release/{}/{}", gh.owner, gh.repo)
            }
            PackageKind::GitHub(gh) => format!("github.com/{}/{}", gh.owner, gh.repo),
            PackageKind::Gist(gist) => format!("gist.github.com/{}/{}", gist.owner, gist.id),
            PackageKind::Http(http) => match Url::parse(&http.url) {
                Ok(u) => format!("{}{}", u.host_str().unwrap_or_default(), u.path()),
                Err(_) => http.url.clone(),
            },
            PackageKind::Local(_) => self.home.to_string_lossy().to_string(),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    pub fn package_type(&self) -> PackageType {
        match &self.kind {
            PackageKind::GitHub(gh) if gh.release.is_some() => PackageType::GitHubRelease,
            PackageKind::GitHub(_) => PackageType::GitHub,
            PackageKind::Gist(_) => PackageType::Gist,
            PackageKind::Http(_) => PackageType::Http,
            PackageKind::Local(_) => PackageType::Local,
        }
    }

    pub fn release(&self) -> Option<&Release> {
        match &self.kind {
            PackageKind::GitHub(gh) => gh.release.as_ref(),
            _ => None,
        }
    }

    /// Declared release tag for release-backed packages, empty otherwise.
    pub fn version(&self) -> String {
        self.release().map(|r| r.tag.clone()).unwrap_or_default()
    }

    pub fn description(&self) -> &str {
        match &self.kind {
            PackageKind::GitHub(p) => &p.description,
            PackageKind::Gist(p) => &p.description,
            PackageKind::Http(p) => &p.description,
            PackageKind::Local(p) => &p.description,
        }
    }

    pub fn plugin(&self) -> Option<&Plugin> {
        match &self.kind {
            PackageKind::GitHub(p) => p.plugin.as_ref(),
            PackageKind::Gist(p) => p.plugin.as_ref(),
            PackageKind::Http(p) => p.plugin.as_ref(),
            PackageKind::Local(p) => p.plugin.as_ref(),
        }
    }

    pub fn command(&self) -> Option<&Command> {
        match &self.kind {
            PackageKind::GitHub(p) => p.command.as_ref(),
            PackageKind::Gist(p) => p.command.as_ref(),
            PackageKind::Http(p) => p.command.as_ref(),
            PackageKind::Local(p) => p.command.as_ref(),
        }
    }

    pub fn depends_on(&self) -> &[String] {
        match &self.kind {
            PackageKind::GitHub(p) => &p.depends_on,
            PackageKind::Gist(p) => &p.depends_on,
            PackageKind::Http(p) => &p.depends_on,
            PackageKind::Local(p) => &p.depends_on,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.kind, PackageKind::Local(_))
    }

    /// Expands a glob relative to the package home.
    pub fn glob(&self, pattern: &str) -> Vec<PathBuf> {
        glob_under(&self.home, pattern)
    }

    /// Where the symlink for `link` is created, given the matched source.
    pub fn link_destination(&self, link: &Link, source: Option<&Path>) -> PathBuf {
        if link.to.is_empty() {
            let base = source
                .and_then(|s| s.file_name())
                .map(PathBuf::from)
                .or_else(|| Path::new(&link.from).file_name().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(self.name()));
            return self.bin_dir.join(base);
        }
        let to = expand_home(&link.to);
        if to.is_absolute() {
            to
        } else {
            self.bin_dir.join(to)
        }
    }

    /// Projects the package onto the record persisted in the state file.
    pub fn resource(&self) -> Resource {
        let mut paths = Vec::new();
        // Local directories belong to the user; nothing is installed into them.
        if !self.is_local() {
            paths.push(self.home.to_string_lossy().to_string());
        }
        if let Some(command) = self.command().filter(|_| !self.is_local()) {
            for link in &command.link {
                // Unresolved links are never materialised, so they are not recorded.
                if let [source] = self.glob(&link.from).as_slice() {
                    let dest = self.link_destination(link, Some(source.as_path()));
                    paths.push(source.to_string_lossy().to_string());
                    paths.push(dest.to_string_lossy().to_string());
                }
            }
        }
        Resource {
            id: self.id(),
            name: self.name().to_string(),
            home: self.home.to_string_lossy().to_string(),
            resource_type: self.package_type().label().to_string(),
            version: self.version(),
            paths,
        }
    }
}

pub fn glob_under(root: &Path, pattern: &str) -> Vec<PathBuf> {
    let full = root.join(pattern);
    let full = full.to_string_lossy();
    match glob::glob(&full) {
        Ok(paths) => paths.filter_map(|p| p.ok()).collect(),
        Err(e) => {
            warn!("Invalid glob pattern '{}': {}", full, e);
            Vec::new()
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}
