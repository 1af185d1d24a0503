// afx-common/src/manifest.rs
//! Discovers and decodes the YAML package manifests under the config root.
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{AfxError, Result};
use crate::model::{Gist, GitHub, Http, Local, Package, PackageKind};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub github: Vec<GitHub>,
    #[serde(default)]
    pub gist: Vec<Gist>,
    #[serde(default)]
    pub local: Vec<Local>,
    #[serde(default)]
    pub http: Vec<Http>,
}

impl Manifest {
    pub fn parse(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn merge(&mut self, other: Manifest) {
        self.github.extend(other.github);
        self.gist.extend(other.gist);
        self.local.extend(other.local);
        self.http.extend(other.http);
    }

    /// Validates the merged manifest and resolves every block into a package.
    pub fn into_packages(self, config: &Config) -> Result<Vec<Package>> {
        let mut kinds = Vec::new();
        kinds.extend(self.github.into_iter().map(PackageKind::GitHub));
        kinds.extend(self.gist.into_iter().map(PackageKind::Gist));
        kinds.extend(self.local.into_iter().map(PackageKind::Local));
        kinds.extend(self.http.into_iter().map(PackageKind::Http));

        let mut names = HashSet::new();
        let mut packages = Vec::with_capacity(kinds.len());
        for kind in kinds {
            validate(&kind)?;
            let pkg = Package::new(kind, config)?;
            if !names.insert(pkg.name().to_string()) {
                return Err(AfxError::Config(format!(
                    "duplicate package name '{}'",
                    pkg.name()
                )));
            }
            packages.push(pkg);
        }
        Ok(packages)
    }
}

fn validate(kind: &PackageKind) -> Result<()> {
    let missing = |name: &str, field: &str| {
        AfxError::Config(format!("package '{name}': field '{field}' is required"))
    };
    match kind {
        PackageKind::GitHub(gh) => {
            if gh.name.is_empty() {
                return Err(missing(&gh.repo, "name"));
            }
            if gh.owner.is_empty() {
                return Err(missing(&gh.name, "owner"));
            }
            if gh.repo.is_empty() {
                return Err(missing(&gh.name, "repo"));
            }
            if let Some(release) = &gh.release {
                if release.name.is_empty() {
                    return Err(missing(&gh.name, "release.name"));
                }
            }
        }
        PackageKind::Gist(gist) => {
            if gist.name.is_empty() {
                return Err(missing(&gist.id, "name"));
            }
            if gist.owner.is_empty() {
                return Err(missing(&gist.name, "owner"));
            }
            if gist.id.is_empty() {
                return Err(missing(&gist.name, "id"));
            }
        }
        PackageKind::Http(http) => {
            if http.name.is_empty() {
                return Err(missing(&http.url, "name"));
            }
            if http.url.is_empty() {
                return Err(missing(&http.name, "url"));
            }
        }
        PackageKind::Local(local) => {
            if local.name.is_empty() {
                return Err(missing(&local.directory, "name"));
            }
            if local.directory.is_empty() {
                return Err(missing(&local.name, "directory"));
            }
        }
    }
    Ok(())
}

fn is_manifest(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Lists every manifest file below `root`, sorted for deterministic merging.
pub fn find_manifests(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_manifest(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

pub fn load_packages(config: &Config) -> Result<Vec<Package>> {
    let root = &config.config_root;
    if !root.exists() {
        debug!("Config root {} does not exist, no packages", root.display());
        return Ok(Vec::new());
    }

    let mut manifest = Manifest::default();
    for file in find_manifests(root) {
        debug!("Reading manifest {}", file.display());
        let source = fs::read_to_string(&file)?;
        let parsed = Manifest::parse(&source)
            .map_err(|e| AfxError::Config(format!("{}: {}", file.display(), e)))?;
        manifest.merge(parsed);
    }
    let packages = manifest.into_packages(config)?;
    debug!("Loaded {} packages from {}", packages.len(), root.display());
    Ok(packages)
}
