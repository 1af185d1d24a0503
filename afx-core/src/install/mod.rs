// afx-core/src/install/mod.rs
//! Per-kind install operations and the shared post-fetch steps.
use afx_common::error::{AfxError, Result};
use afx_common::{Outcome, Package, PackageKind};
use tracing::{debug, instrument};

use crate::context::InstallContext;

pub mod command;
pub mod gist;
pub mod github;
pub mod http;
pub mod plugin;
pub mod release;

/// Fetches `pkg` into its home and runs its command and plugin steps.
#[instrument(skip_all, fields(pkg = %pkg.name(), kind = %pkg.package_type()))]
pub async fn install_package(ctx: &InstallContext, pkg: &Package) -> Result<Outcome> {
    if ctx.is_cancelled() {
        return Err(AfxError::Cancelled);
    }
    debug!("Installing {} into {}", pkg.id(), pkg.home().display());
    match &pkg.kind {
        PackageKind::GitHub(gh) if gh.release.is_some() => release::install(ctx, pkg).await,
        PackageKind::GitHub(gh) => github::install(ctx, pkg, gh).await,
        PackageKind::Gist(gist) => gist::install(ctx, pkg, gist).await,
        PackageKind::Http(http) => http::install(ctx, pkg, http).await,
        PackageKind::Local(_) => {
            debug!("{} is a local directory, nothing to install", pkg.name());
            Ok(Outcome::hidden())
        }
    }
}

/// Runs after the kind-specific fetch succeeded.
pub(crate) async fn finish(ctx: &InstallContext, pkg: &Package) -> Result<()> {
    if let Some(command) = pkg.command() {
        command::install(ctx, pkg, command).await?;
    }
    if let Some(plugin) = pkg.plugin() {
        plugin::install(pkg, plugin);
    }
    Ok(())
}

/// Whether everything `pkg` declares is present on disk.
pub fn installed(pkg: &Package) -> bool {
    if pkg.is_local() {
        return true;
    }
    let command = pkg.command();
    let plugin = pkg.plugin();
    if command.is_none() && plugin.is_none() {
        return pkg.home().exists();
    }
    command.map(|c| command::installed(pkg, c)).unwrap_or(true)
        && plugin.map(|p| plugin::installed(pkg, p)).unwrap_or(true)
}
