// afx-core/src/check.rs
//! Reports whether a newer release exists for release-backed packages.
use afx_common::error::Result;
use afx_common::{Outcome, Package, PackageKind};
use afx_net::github::ReleaseQuery;
use semver::Version;
use tracing::{debug, instrument};

use crate::context::InstallContext;

#[instrument(skip_all, fields(pkg = %pkg.name()))]
pub async fn check_package(ctx: &InstallContext, pkg: &Package) -> Result<Outcome> {
    let PackageKind::GitHub(gh) = &pkg.kind else {
        return Ok(Outcome::hidden());
    };
    let Some(release) = &gh.release else {
        if let Ok(revision) = afx_aio::git2::head_summary(pkg.home()) {
            debug!("{} is at {}", pkg.name(), revision);
        }
        return Ok(Outcome::hidden());
    };

    let latest = ctx
        .github
        .latest_release(&gh.owner, &gh.repo, &ctx.cancel)
        .await?;
    Ok(compare(&release.tag, &latest.tag_name))
}

fn parse(tag: &str) -> Option<Version> {
    Version::parse(tag.trim().trim_start_matches('v')).ok()
}

/// Compares the declared tag with the latest published one.
pub fn compare(current: &str, latest: &str) -> Outcome {
    if ReleaseQuery::from_tag(current) == ReleaseQuery::Latest {
        return Outcome::message(format!("up-to-date (tracking {latest})"));
    }
    let newer = match (parse(current), parse(latest)) {
        (Some(current), Some(latest)) => latest > current,
        _ => {
            debug!("Comparing unparseable tags '{}' and '{}' literally", current, latest);
            current != latest
        }
    };
    if newer {
        Outcome::highlighted(format!("new! {current} -> {latest}"))
    } else {
        Outcome::message("up-to-date")
    }
}
