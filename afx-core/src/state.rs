// afx-core/src/state.rs
//! Persisted install records and the change sets derived from them.
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use afx_aio::json_io;
use afx_common::error::{AfxError, Result};
use afx_common::model::{Package, Resource};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

const STATE_FILE_MODE: u32 = 0o644;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    resources: BTreeMap<String, Resource>,
}

/// The five change sets, computed once when the state is opened.
#[derive(Debug, Clone, Default)]
pub struct ChangeSets {
    pub additions: Vec<Package>,
    pub readditions: Vec<Package>,
    pub changes: Vec<Package>,
    pub deletions: Vec<Resource>,
    pub no_changes: Vec<Package>,
}

impl ChangeSets {
    fn classify(packages: &[Package], resources: &BTreeMap<String, Resource>) -> Self {
        let mut sets = ChangeSets::default();
        let mut configured = HashSet::with_capacity(packages.len());

        for pkg in packages {
            let id = pkg.id();
            configured.insert(id.clone());
            let Some(resource) = resources.get(&id) else {
                sets.additions.push(pkg.clone());
                continue;
            };
            let missing = resource.missing_paths();
            if !missing.is_empty() {
                debug!("{} is broken, missing {:?}", id, missing);
                sets.readditions.push(pkg.clone());
            } else if !resource.version.is_empty() && resource.version != pkg.version() {
                debug!(
                    "{} changed version {} -> {}",
                    id,
                    resource.version,
                    pkg.version()
                );
                sets.changes.push(pkg.clone());
            } else {
                sets.no_changes.push(pkg.clone());
            }
        }

        sets.deletions = resources
            .values()
            .filter(|r| !configured.contains(&r.id))
            .cloned()
            .collect();
        sets
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty()
            && self.readditions.is_empty()
            && self.changes.is_empty()
            && self.deletions.is_empty()
    }
}

/// State store backed by a JSON file. Mutations are serialised by one lock and
/// each one rewrites the whole file atomically.
#[derive(Debug)]
pub struct State {
    path: PathBuf,
    packages: Vec<Package>,
    resources: RwLock<BTreeMap<String, Resource>>,
    sets: ChangeSets,
}

impl State {
    #[instrument(skip_all, fields(path = %path.display(), packages = packages.len()))]
    pub fn open(path: &Path, packages: &[Package]) -> Result<Self> {
        let file: StateFile = json_io::read_json(path)
            .map_err(|e| AfxError::State(format!("{}: {}", path.display(), e)))?
            .unwrap_or_default();
        let mut resources = file.resources;
        for (key, resource) in resources.iter_mut() {
            if resource.id.is_empty() {
                resource.id = key.clone();
            }
        }

        let sets = ChangeSets::classify(packages, &resources);
        debug!(
            "Change sets: {} additions, {} readditions, {} changes, {} deletions, {} unchanged",
            sets.additions.len(),
            sets.readditions.len(),
            sets.changes.len(),
            sets.deletions.len(),
            sets.no_changes.len()
        );

        // Records of known-good packages follow the live configuration.
        for pkg in &sets.no_changes {
            let live = pkg.resource();
            if resources.get(&live.id) != Some(&live) {
                debug!("Refreshing drifted record for {}", live.id);
                resources.insert(live.id.clone(), live);
            }
        }

        let state = Self {
            path: path.to_path_buf(),
            packages: packages.to_vec(),
            resources: RwLock::new(resources),
            sets,
        };
        state.save(&*state.read()?)?;
        Ok(state)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn additions(&self) -> &[Package] {
        &self.sets.additions
    }

    pub fn readditions(&self) -> &[Package] {
        &self.sets.readditions
    }

    pub fn changes(&self) -> &[Package] {
        &self.sets.changes
    }

    pub fn deletions(&self) -> &[Resource] {
        &self.sets.deletions
    }

    pub fn no_changes(&self) -> &[Package] {
        &self.sets.no_changes
    }

    pub fn change_sets(&self) -> &ChangeSets {
        &self.sets
    }

    /// Additions followed by readditions; both are (re)installed from scratch.
    pub fn to_install(&self) -> Vec<Package> {
        self.sets
            .additions
            .iter()
            .chain(self.sets.readditions.iter())
            .cloned()
            .collect()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Resource>>> {
        self.resources
            .read()
            .map_err(|_| AfxError::State("state lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Resource>>> {
        self.resources
            .write()
            .map_err(|_| AfxError::State("state lock poisoned".to_string()))
    }

    fn save(&self, resources: &BTreeMap<String, Resource>) -> Result<()> {
        let file = StateFile {
            resources: resources.clone(),
        };
        json_io::write_json(&self.path, &file, STATE_FILE_MODE).map_err(|e| {
            warn!("Failed to persist state to {}: {}", self.path.display(), e);
            AfxError::State(format!("{}: {}", self.path.display(), e))
        })
    }

    pub fn add(&self, pkg: &Package) -> Result<()> {
        let resource = pkg.resource();
        debug!("Recording {} in state", resource.id);
        let mut guard = self.write()?;
        guard.insert(resource.id.clone(), resource);
        self.save(&guard)
    }

    pub fn update(&self, pkg: &Package) -> Result<()> {
        let resource = pkg.resource();
        let mut guard = self.write()?;
        if !guard.contains_key(&resource.id) {
            return Err(AfxError::State(format!(
                "{} is not recorded in state",
                resource.id
            )));
        }
        debug!("Updating {} in state", resource.id);
        guard.insert(resource.id.clone(), resource);
        self.save(&guard)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let mut guard = self.write()?;
        if guard.remove(id).is_none() {
            debug!("{} was not recorded in state", id);
        }
        self.save(&guard)
    }

    pub fn get(&self, id: &str) -> Result<Option<Resource>> {
        Ok(self.read()?.get(id).cloned())
    }

    /// IDs currently persisted.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    pub fn resources(&self) -> Result<Vec<Resource>> {
        Ok(self.read()?.values().cloned().collect())
    }

    /// Discards every record and rebuilds the state from the configured packages.
    pub fn reset(&self) -> Result<()> {
        let mut guard = self.write()?;
        guard.clear();
        for pkg in &self.packages {
            let resource = pkg.resource();
            guard.insert(resource.id.clone(), resource);
        }
        debug!("Rebuilt state with {} records", guard.len());
        self.save(&guard)
    }

    /// Syncs persisted records with their live projection. Does nothing while
    /// any change is pending.
    pub fn refresh(&self) -> Result<()> {
        if !self.sets.is_empty() {
            debug!("Pending changes, skipping state refresh");
            return Ok(());
        }
        let mut guard = self.write()?;
        let mut dirty = false;
        for pkg in &self.packages {
            let live = pkg.resource();
            if guard.get(&live.id) != Some(&live) {
                debug!("Refreshing record for {}", live.id);
                guard.insert(live.id.clone(), live);
                dirty = true;
            }
        }
        if dirty {
            self.save(&guard)?;
        }
        Ok(())
    }
}
