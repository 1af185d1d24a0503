// afx-core/src/release.rs
//! Picks and fetches the asset of a GitHub release that fits this host.
use std::path::PathBuf;

use afx_common::error::{AfxError, Result};
use afx_common::model::Release as ReleaseConfig;
use afx_common::Package;
use afx_net::github::{Release, ReleaseAsset, ReleaseQuery};
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::context::InstallContext;
use crate::template::{self, TemplateData};

/// Host operating system and architecture, named the way release assets are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn current() -> Self {
        Self {
            os: template::current_os().to_string(),
            arch: template::current_arch().to_string(),
        }
    }

    fn os_pattern(&self) -> Option<&'static str> {
        match self.os.as_str() {
            "darwin" => Some(".*(apple|darwin|Darwin|osx|mac|macos|macOS).*"),
            "linux" => Some(".*linux.*"),
            _ => None,
        }
    }

    fn arch_pattern(&self) -> Option<&'static str> {
        match self.arch.as_str() {
            "amd64" => Some(".*(amd64|64).*"),
            "386" => Some(".*(386|86).*"),
            "arm64" => Some(".*(arm64|aarch64).*"),
            _ => None,
        }
    }
}

struct AssetFilter {
    pattern: &'static str,
    keep: bool,
}

/// Applies `filter` unless doing so would leave nothing.
fn narrow<'a>(assets: Vec<&'a ReleaseAsset>, filter: &AssetFilter) -> Result<Vec<&'a ReleaseAsset>> {
    let re = Regex::new(filter.pattern)
        .map_err(|e| AfxError::Generic(format!("bad asset pattern {}: {e}", filter.pattern)))?;
    let narrowed: Vec<&ReleaseAsset> = assets
        .iter()
        .copied()
        .filter(|a| re.is_match(&a.name) == filter.keep)
        .collect();
    if narrowed.is_empty() {
        debug!("Skipping asset filter {} (would drop every asset)", filter.pattern);
        return Ok(assets);
    }
    Ok(narrowed)
}

/// Chooses one asset.
///
/// A rendered `filename` must match an asset name exactly. Without one, a
/// single asset is taken as is and longer lists go through the exclusion and
/// platform filters in order.
pub fn select_asset<'a>(
    assets: &'a [ReleaseAsset],
    filename: Option<&str>,
    platform: &Platform,
) -> Result<&'a ReleaseAsset> {
    if let Some(filename) = filename {
        return assets.iter().find(|a| a.name == filename).ok_or_else(|| {
            AfxError::AssetNotFound(format!("no release asset named '{filename}'"))
        });
    }

    match assets {
        [] => return Err(AfxError::AssetNotFound("release has no assets".to_string())),
        [only] => return Ok(only),
        _ => {}
    }

    let mut filters = vec![
        AssetFilter {
            pattern: r".*\.sbom",
            keep: false,
        },
        AssetFilter {
            pattern: ".*(sha256sum|checksum).*",
            keep: false,
        },
    ];
    if let Some(pattern) = platform.os_pattern() {
        filters.push(AssetFilter {
            pattern,
            keep: true,
        });
    }
    if let Some(pattern) = platform.arch_pattern() {
        filters.push(AssetFilter {
            pattern,
            keep: true,
        });
    }

    let mut candidates: Vec<&ReleaseAsset> = assets.iter().collect();
    for filter in &filters {
        candidates = narrow(candidates, filter)?;
    }

    let names: Vec<&str> = candidates.iter().map(|a| a.name.as_str()).collect();
    if names.len() > 1 {
        warn!(
            "{} assets match {}/{}, using the first: {:?}",
            names.len(),
            platform.os,
            platform.arch,
            names
        );
    }
    candidates
        .first()
        .copied()
        .ok_or_else(|| AfxError::AssetNotFound("no asset left after filtering".to_string()))
}

/// Renders the configured asset filename for `tag`. A template error is logged
/// and treated as if no filename had been configured.
pub fn render_filename(pkg: &Package, config: &ReleaseConfig, tag: &str) -> Option<String> {
    let asset = config.asset.as_ref()?;
    if asset.filename.trim().is_empty() {
        return None;
    }
    let mut data = TemplateData::for_package(pkg);
    data.release.tag = tag.to_string();
    data.replace(&asset.replacements);
    match template::render(&asset.filename, &data) {
        Ok(rendered) => Some(rendered),
        Err(e) => {
            warn!(
                "{}: could not render asset filename '{}': {}; falling back to platform matching",
                pkg.name(),
                asset.filename,
                e
            );
            None
        }
    }
}

/// Looks up the configured release of `pkg` and chooses its asset.
#[instrument(skip_all, fields(pkg = %pkg.name()))]
pub async fn resolve(ctx: &InstallContext, pkg: &Package) -> Result<(Release, ReleaseAsset)> {
    let (owner, repo, config) = release_coordinates(pkg)?;
    let query = ReleaseQuery::from_tag(&config.tag);
    let release = ctx
        .github
        .fetch_release(owner, repo, &query, &ctx.cancel)
        .await?;
    debug!("Resolved {}/{} {:?} to {}", owner, repo, query, release.tag_name);

    let filename = render_filename(pkg, config, &release.tag_name);
    let asset = select_asset(&release.assets, filename.as_deref(), &Platform::current())?.clone();
    debug!("Selected asset {} for {}", asset.name, pkg.name());
    Ok((release, asset))
}

/// Streams `asset` to `<home>/<asset name>`.
pub async fn download(ctx: &InstallContext, pkg: &Package, asset: &ReleaseAsset) -> Result<PathBuf> {
    let dest = pkg.home().join(&asset.name);
    let url = if asset.browser_download_url.is_empty() {
        &asset.url
    } else {
        &asset.browser_download_url
    };
    afx_net::download_file(&ctx.http, url, &dest, ctx.github.token(), &ctx.cancel).await
}

pub(crate) fn release_coordinates(pkg: &Package) -> Result<(&str, &str, &ReleaseConfig)> {
    match &pkg.kind {
        afx_common::PackageKind::GitHub(gh) => match &gh.release {
            Some(release) => Ok((gh.owner.as_str(), gh.repo.as_str(), release)),
            None => Err(AfxError::Generic(format!("{} has no release block", pkg.name()))),
        },
        _ => Err(AfxError::Generic(format!("{} is not a GitHub package", pkg.name()))),
    }
}
