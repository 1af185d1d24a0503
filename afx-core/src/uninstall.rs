// afx-core/src/uninstall.rs
//! Removal of installed packages, from live configuration or from a record.
use std::path::Path;

use afx_aio::fs as afx_fs;
use afx_common::error::{ErrorList, Result};
use afx_common::{Package, Resource};
use tracing::{debug, instrument, warn};

fn remove_into(path: &Path, errors: &mut ErrorList) {
    if let Err(e) = afx_fs::remove_path(path) {
        warn!("Failed to remove {}: {}", path.display(), e);
        errors.push(e);
    }
}

/// Removes every link source and destination of `pkg`, then its home.
/// Failures are collected and reported together once everything was tried.
#[instrument(skip_all, fields(pkg = %pkg.name()))]
pub fn uninstall_package(pkg: &Package) -> Result<()> {
    if pkg.is_local() {
        debug!("{} is a local directory, leaving it alone", pkg.name());
        return Ok(());
    }
    let mut errors = ErrorList::new();
    if let Some(command) = pkg.command() {
        for link in &command.link {
            let sources = pkg.glob(&link.from);
            if sources.is_empty() {
                remove_into(&pkg.link_destination(link, None), &mut errors);
            }
            for source in sources {
                remove_into(&pkg.link_destination(link, Some(source.as_path())), &mut errors);
                remove_into(&source, &mut errors);
            }
        }
    }
    remove_into(pkg.home(), &mut errors);
    match errors.into_error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Removes everything `resource` recorded, then its home.
#[instrument(skip_all, fields(id = %resource.id))]
pub fn uninstall_resource(resource: &Resource) -> Result<()> {
    if resource.is_local() {
        debug!("{} is a local directory, leaving it alone", resource.id);
        return Ok(());
    }
    let mut errors = ErrorList::new();
    for path in &resource.paths {
        remove_into(Path::new(path), &mut errors);
    }
    if !resource.home.is_empty() {
        remove_into(Path::new(&resource.home), &mut errors);
    }
    match errors.into_error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
