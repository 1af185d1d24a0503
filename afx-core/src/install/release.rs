// afx-core/src/install/release.rs
use afx_aio::extract::{unarchive, Unarchived};
use afx_aio::fs as afx_fs;
use afx_common::error::Result;
use afx_common::{Outcome, Package};
use tracing::debug;

use crate::context::InstallContext;
use crate::release;

/// Resolves the release asset, downloads it into the home and unpacks it.
pub async fn install(ctx: &InstallContext, pkg: &Package) -> Result<Outcome> {
    let (_, _, config) = release::release_coordinates(pkg)?;
    let binary_name = if config.name.is_empty() {
        pkg.name().to_string()
    } else {
        config.name.clone()
    };

    let (found, asset) = release::resolve(ctx, pkg).await?;
    afx_fs::create_dir_all(pkg.home())?;
    let archive = release::download(ctx, pkg, &asset).await?;

    match unarchive(&archive, pkg.home(), &binary_name, None).await? {
        Unarchived::Extracted(format) => {
            debug!("[{}] extracted {} ({:?})", pkg.name(), asset.name, format)
        }
        Unarchived::Renamed(path) => {
            debug!("[{}] installed bare binary {}", pkg.name(), path.display())
        }
        Unarchived::Kept(path) => debug!(
            "[{}] {} already present, kept download at {}",
            pkg.name(),
            binary_name,
            path.display()
        ),
    }
    super::finish(ctx, pkg).await?;
    Ok(Outcome::message(found.tag_name))
}
