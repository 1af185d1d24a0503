// afx/src/cli/runner.rs
//! Wiring shared by the commands that drive the executor.
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use afx_common::config::Config;
use afx_common::error::{AfxError, ErrorList, Result};
use afx_common::{manifest, Package};
use afx_core::env::{self, Vault};
use afx_core::{after_run, Executor, InstallContext, State};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Configured packages together with the reconciled state.
pub struct Session {
    pub config: Config,
    pub packages: Vec<Package>,
    pub state: Arc<State>,
}

impl Session {
    #[instrument(skip_all)]
    pub fn open(config: &Config) -> Result<Self> {
        let packages = manifest::load_packages(config)?;
        debug!("Loaded {} packages", packages.len());
        let state = State::open(&config.state_file(), &packages)?;
        Ok(Self {
            config: config.clone(),
            packages,
            state: Arc::new(state),
        })
    }

    /// Asks for missing secrets and builds the context every task shares.
    pub fn context(&self, cancel: CancellationToken) -> Result<InstallContext> {
        let mut vault = Vault::load(&self.config.cache_file());
        env::register_defaults(&mut vault, &self.packages);
        vault.ask(&[env::GITHUB_TOKEN, env::SUDO_PASSWORD])?;
        vault.save()?;

        let token = vault
            .get(env::GITHUB_TOKEN)
            .map(str::to_string)
            .or_else(|| self.config.github_api_token.clone());
        let sudo = vault.get(env::SUDO_PASSWORD).map(str::to_string);
        self.build_context(cancel, token, sudo)
    }

    /// Context for operations that never reach the network or run builds.
    pub fn offline_context(&self, cancel: CancellationToken) -> Result<InstallContext> {
        self.build_context(cancel, None, None)
    }

    fn build_context(
        &self,
        cancel: CancellationToken,
        token: Option<String>,
        sudo: Option<String>,
    ) -> Result<InstallContext> {
        let http = afx_net::build_http_client()?;
        Ok(InstallContext::new(self.config.clone(), http, token, sudo, cancel))
    }
}

/// Keeps the `candidates` named on the command line, or all of them when none
/// are. Every name must exist in the configuration.
pub fn select(
    candidates: Vec<Package>,
    configured: &[Package],
    names: &[String],
) -> Result<Vec<Package>> {
    if names.is_empty() {
        return Ok(candidates);
    }
    let known: HashSet<&str> = configured.iter().map(Package::name).collect();
    if let Some(unknown) = names.iter().find(|n| !known.contains(n.as_str())) {
        return Err(AfxError::Config(format!("{unknown}: no such package in config")));
    }
    let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
    Ok(candidates
        .into_iter()
        .filter(|p| wanted.contains(p.name()))
        .collect())
}

/// Runs `op` with a live progress renderer attached, then applies the post-run
/// hook and folds the accumulated errors into one.
pub async fn execute<F, Fut>(
    session: &Session,
    ctx: InstallContext,
    names: Vec<String>,
    op: F,
) -> Result<()>
where
    F: FnOnce(Executor) -> Fut,
    Fut: Future<Output = ErrorList>,
{
    let cache = ctx.config.cache_file();
    let (status_tx, status_rx) = mpsc::channel(1);
    let renderer = tokio::spawn(super::status::handle_events(names, status_rx));

    let executor = Executor::new(ctx, Arc::clone(&session.state), status_tx);
    let errors = op(executor).await;

    if let Err(e) = renderer.await {
        debug!("Progress renderer did not finish cleanly: {}", e);
    }
    after_run(&errors, &cache);
    fold(errors)
}

fn fold(errors: ErrorList) -> Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => errors.into_error().map_or(Ok(()), Err),
        _ => Err(AfxError::Generic(errors.to_string())),
    }
}

pub fn names(packages: &[Package]) -> Vec<String> {
    packages.iter().map(|p| p.name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use afx_common::model::Local;
    use afx_common::PackageKind;

    use super::*;

    fn local(config: &Config, name: &str) -> Package {
        let local = Local {
            name: name.to_string(),
            directory: format!("/tmp/{name}"),
            description: String::new(),
            plugin: None,
            command: None,
            depends_on: Vec::new(),
        };
        Package::new(PackageKind::Local(local), config).unwrap()
    }

    #[test]
    fn select_filters_by_name_and_rejects_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_root(tmp.path());
        let packages = vec![local(&config, "a"), local(&config, "b")];

        assert_eq!(select(packages.clone(), &packages, &[]).unwrap().len(), 2);
        let picked = select(packages.clone(), &packages, &["b".to_string()]).unwrap();
        assert_eq!(names(&picked), vec!["b".to_string()]);
        // Configured but not a candidate: silently skipped.
        let pending = vec![packages[0].clone()];
        assert!(select(pending, &packages, &["b".to_string()]).unwrap().is_empty());
        assert!(matches!(
            select(packages.clone(), &packages, &["zzz".to_string()]),
            Err(AfxError::Config(_))
        ));
    }

    #[test]
    fn fold_keeps_single_errors_and_enumerates_many() {
        assert!(fold(ErrorList::new()).is_ok());

        let mut one = ErrorList::new();
        one.push(AfxError::Build("boom".to_string()));
        assert!(matches!(fold(one), Err(AfxError::Build(_))));

        let mut many = ErrorList::new();
        many.push(AfxError::Build("boom".to_string()));
        many.push(AfxError::Link("ambiguous".to_string()));
        let message = fold(many).unwrap_err().to_string();
        assert!(message.contains("1. "));
        assert!(message.contains("2. "));
    }
}
