// afx-aio/src/git2.rs
// Blocking Git operations using git2. Callers run these in spawn_blocking.
use std::path::Path;

use afx_common::error::{AfxError, Result};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{FetchOptions, RemoteCallbacks, Repository};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(Debug, Clone, Default)]
pub struct CloneRequest<'a> {
    pub url: &'a str,
    pub branch: Option<&'a str>,
    pub depth: Option<u32>,
}

fn fetch_options<'cb>(cancel: &'cb CancellationToken, depth: Option<u32>) -> FetchOptions<'cb> {
    let mut callbacks = RemoteCallbacks::new();
    // Returning false aborts the transfer.
    callbacks.transfer_progress(move |_| !cancel.is_cancelled());
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    if let Some(depth) = depth {
        options.depth(depth as i32);
    }
    options
}

fn map_git_error(err: git2::Error, cancel: &CancellationToken, what: &str) -> AfxError {
    if cancel.is_cancelled() {
        return AfxError::Cancelled;
    }
    error!("git {} failed: {}", what, err);
    AfxError::Fetch(format!("{what}: {err}"))
}

/// Clones `request.url` into `path`, or opens the existing repository there.
/// With a branch, fetches it and force-checks out `refs/heads/<branch>`.
pub fn clone_or_open(
    request: &CloneRequest<'_>,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(AfxError::Cancelled);
    }

    let repo = if path.join(".git").exists() {
        debug!("Opening existing repository at {}", path.display());
        Repository::open(path).map_err(|e| map_git_error(e, cancel, "open"))?
    } else {
        debug!("Cloning {} into {}", request.url, path.display());
        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options(cancel, request.depth));
        builder
            .clone(request.url, path)
            .map_err(|e| map_git_error(e, cancel, &format!("clone {}", request.url)))?
    };

    if let Some(branch) = request.branch.filter(|b| !b.is_empty()) {
        checkout_branch(&repo, branch, request.depth, cancel)?;
    }
    Ok(())
}

fn checkout_branch(
    repo: &Repository,
    branch: &str,
    depth: Option<u32>,
    cancel: &CancellationToken,
) -> Result<()> {
    debug!("Fetching branch {}", branch);
    let mut remote = repo
        .find_remote("origin")
        .map_err(|e| map_git_error(e, cancel, "find remote origin"))?;
    let refspec = format!("refs/heads/{branch}:refs/remotes/origin/{branch}");
    remote
        .fetch(&[refspec.as_str()], Some(&mut fetch_options(cancel, depth)), None)
        .map_err(|e| map_git_error(e, cancel, &format!("fetch {branch}")))?;

    let remote_ref = repo
        .find_reference(&format!("refs/remotes/origin/{branch}"))
        .map_err(|e| map_git_error(e, cancel, &format!("find branch {branch}")))?;
    let commit = remote_ref
        .peel_to_commit()
        .map_err(|e| map_git_error(e, cancel, &format!("resolve branch {branch}")))?;

    let local = format!("refs/heads/{branch}");
    repo.reference(&local, commit.id(), true, &format!("afx: reset {branch}"))
        .map_err(|e| map_git_error(e, cancel, &format!("update {local}")))?;
    repo.set_head(&local)
        .map_err(|e| map_git_error(e, cancel, &format!("set HEAD to {local}")))?;
    repo.checkout_head(Some(CheckoutBuilder::default().force()))
        .map_err(|e| map_git_error(e, cancel, &format!("checkout {local}")))?;
    debug!("Checked out {} at {}", local, commit.id());
    Ok(())
}

/// Short description of the checked out revision.
pub fn head_summary(path: &Path) -> Result<String> {
    let repo = Repository::open(path)?;
    let head = repo.head()?;
    let commit = head.peel_to_commit()?;
    let id = commit.id().to_string();
    let short = &id[..id.len().min(7)];
    Ok(match head.shorthand() {
        Some(name) if head.is_branch() => format!("{name}@{short}"),
        _ => short.to_string(),
    })
}
