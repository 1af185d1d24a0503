// afx-core/src/install/github.rs
use afx_aio::git2::{self as git, CloneRequest};
use afx_common::error::{AfxError, Result};
use afx_common::model::GitHub;
use afx_common::{Outcome, Package};
use tracing::debug;

use crate::context::InstallContext;

/// Clones (or reopens) the repository, then runs the command and plugin steps.
pub async fn install(ctx: &InstallContext, pkg: &Package, gh: &GitHub) -> Result<Outcome> {
    let url = gh.clone_url();
    let branch = gh.branch.clone();
    let depth = gh.depth();
    clone(ctx, url, branch, depth, pkg).await?;
    super::finish(ctx, pkg).await?;

    let revision = git::head_summary(pkg.home()).unwrap_or_default();
    debug!("[{}] checked out {}", pkg.name(), revision);
    Ok(Outcome::message(revision))
}

/// Runs the blocking clone on the blocking pool.
pub(crate) async fn clone(
    ctx: &InstallContext,
    url: String,
    branch: Option<String>,
    depth: Option<u32>,
    pkg: &Package,
) -> Result<()> {
    let home = pkg.home().to_path_buf();
    if let Some(parent) = home.parent() {
        afx_aio::fs::create_dir_all(parent)?;
    }
    let cancel = ctx.cancel.clone();
    tokio::task::spawn_blocking(move || {
        let request = CloneRequest {
            url: &url,
            branch: branch.as_deref(),
            depth,
        };
        git::clone_or_open(&request, &home, &cancel)
    })
    .await
    .map_err(|e| AfxError::Fetch(format!("clone task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use afx_common::model::{Command, Link, Plugin};
    use afx_common::{Config, PackageKind};
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn seed(path: &Path) {
        let repo = git2::Repository::init(path).unwrap();
        fs::write(path.join("enhancd.sh"), "echo enhancd\n").unwrap();
        fs::write(path.join("cd-tool"), "#!/bin/sh\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("enhancd.sh")).unwrap();
        index.add_path(Path::new("cd-tool")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("afx", "afx@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).unwrap();
    }

    #[tokio::test]
    async fn clone_then_finish_links_and_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let upstream = tmp.path().join("upstream");
        fs::create_dir_all(&upstream).unwrap();
        seed(&upstream);

        let config = Config::with_root(tmp.path());
        let gh = GitHub {
            name: "enhancd".to_string(),
            owner: "b4b4r07".to_string(),
            repo: "enhancd".to_string(),
            branch: None,
            with: None,
            description: String::new(),
            release: None,
            plugin: Some(Plugin {
                sources: vec!["*.sh".to_string()],
                ..Default::default()
            }),
            command: Some(Command {
                link: vec![Link {
                    from: "cd-tool".to_string(),
                    to: String::new(),
                }],
                ..Default::default()
            }),
            depends_on: Vec::new(),
        };
        let pkg = Package::new(PackageKind::GitHub(gh), &config).unwrap();
        let ctx = InstallContext::new(
            config.clone(),
            reqwest::Client::new(),
            None,
            None,
            CancellationToken::new(),
        );

        let url = upstream.to_string_lossy().to_string();
        clone(&ctx, url, None, None, &pkg).await.unwrap();
        super::super::finish(&ctx, &pkg).await.unwrap();

        assert!(super::super::installed(&pkg));
        assert!(tmp.path().join("bin/cd-tool").exists());
        assert!(git::head_summary(pkg.home()).unwrap().len() >= 7);
    }

    #[tokio::test]
    async fn cancelled_clone_reports_cancellation() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_root(tmp.path());
        let gh = GitHub {
            name: "x".to_string(),
            owner: "o".to_string(),
            repo: "x".to_string(),
            branch: None,
            with: None,
            description: String::new(),
            release: None,
            plugin: None,
            command: None,
            depends_on: Vec::new(),
        };
        let pkg = Package::new(PackageKind::GitHub(gh), &config).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = InstallContext::new(config, reqwest::Client::new(), None, None, cancel);

        let err = clone(&ctx, "/nonexistent".to_string(), None, None, &pkg)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
