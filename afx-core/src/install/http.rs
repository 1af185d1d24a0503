// afx-core/src/install/http.rs
use afx_aio::extract::{unarchive, ArchiveFormat};
use afx_aio::fs as afx_fs;
use afx_common::error::Result;
use afx_common::model::Http;
use afx_common::{Outcome, Package};
use tracing::debug;

use crate::context::InstallContext;

/// Downloads the URL into the home and extracts it when the bytes look like an
/// archive. Anything else is left where it was written.
pub async fn install(ctx: &InstallContext, pkg: &Package, http: &Http) -> Result<Outcome> {
    let dest = http.destination(pkg.home());
    if let Some(parent) = dest.parent() {
        afx_fs::create_dir_all(parent)?;
    }
    afx_net::download_file(&ctx.http, &http.url, &dest, None, &ctx.cancel).await?;

    let message = match ArchiveFormat::sniff(&dest)? {
        Some(format) => {
            debug!("[{}] {} looks like {:?}", pkg.name(), dest.display(), format);
            unarchive(&dest, pkg.home(), pkg.name(), Some(format)).await?;
            "extracted"
        }
        None => {
            debug!("[{}] {} is not an archive, leaving it in place", pkg.name(), dest.display());
            "downloaded"
        }
    };
    super::finish(ctx, pkg).await?;
    Ok(Outcome::message(message))
}
