// afx-core/src/install/gist.rs
use afx_aio::fs as afx_fs;
use afx_common::error::Result;
use afx_common::model::Gist;
use afx_common::{Outcome, Package};
use tracing::debug;

use crate::context::InstallContext;

/// Gists are always cloned fresh; an existing home is removed first.
pub async fn install(ctx: &InstallContext, pkg: &Package, gist: &Gist) -> Result<Outcome> {
    if afx_fs::path_exists(pkg.home()) {
        debug!("[{}] removing previous clone at {}", pkg.name(), pkg.home().display());
        afx_fs::remove_path(pkg.home())?;
    }
    super::github::clone(ctx, gist.clone_url(), None, None, pkg).await?;
    super::finish(ctx, pkg).await?;
    Ok(Outcome::message("cloned"))
}
