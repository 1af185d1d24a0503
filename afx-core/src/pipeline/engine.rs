// afx-core/src/pipeline/engine.rs
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use afx_common::error::{AfxError, ErrorList, Result};
use afx_common::{Operation, Outcome, Package, Resource, Status};
use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::check::check_package;
use crate::context::InstallContext;
use crate::env;
use crate::install::install_package;
use crate::state::State;
use crate::uninstall::{uninstall_package, uninstall_resource};

/// Upper bound on packages processed at the same time.
pub const MAX_CONCURRENCY: usize = 16;

pub(crate) fn get_panic_message(e: Box<dyn std::any::Any + Send>) -> String {
    match e.downcast_ref::<&'static str>() {
        Some(s) => (*s).to_string(),
        None => match e.downcast_ref::<String>() {
            Some(s) => s.clone(),
            None => "Unknown panic payload".to_string(),
        },
    }
}

async fn send_status(status_tx: &mpsc::Sender<Status>, status: Status) {
    if status_tx.send(status).await.is_err() {
        debug!("Status receiver dropped");
    }
}

fn failure_status(name: &str, err: &AfxError) -> Status {
    Status::failure(name, err.to_string())
}

/// Runs `op` over `targets` with at most `limit` in flight.
///
/// Every target produces exactly one terminal status on `status_tx`, including
/// targets that never started because `cancel` fired first. Errors come back
/// through a results channel drained into the returned list.
pub async fn dispatch<T, F, Fut>(
    targets: Vec<T>,
    limit: usize,
    cancel: CancellationToken,
    status_tx: mpsc::Sender<Status>,
    name_of: fn(&T) -> String,
    op: F,
) -> ErrorList
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outcome>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let op = Arc::new(op);
    let (result_tx, mut result_rx) = mpsc::channel::<AfxError>(targets.len().max(1));

    let collector = tokio::spawn(async move {
        let mut errors = ErrorList::new();
        while let Some(err) = result_rx.recv().await {
            errors.push(err);
        }
        errors
    });

    let mut tasks = JoinSet::new();
    for target in targets {
        let name = name_of(&target);
        let semaphore = Arc::clone(&semaphore);
        let op = Arc::clone(&op);
        let cancel = cancel.clone();
        let status_tx = status_tx.clone();
        let result_tx = result_tx.clone();
        tasks.spawn(async move {
            let task_name = name;
            let permit = tokio::select! {
                permit = semaphore.acquire_owned() => permit,
                _ = cancel.cancelled() => {
                    debug!("[{}] cancelled before start", task_name);
                    send_status(&status_tx, failure_status(&task_name, &AfxError::Cancelled)).await;
                    let _ = result_tx.send(AfxError::Cancelled).await;
                    return;
                }
            };
            let Ok(_permit) = permit else {
                warn!("[{}] semaphore closed", task_name);
                return;
            };

            debug!("[{}] started", task_name);
            let result = match AssertUnwindSafe(op(target)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(AfxError::Generic(format!(
                    "task panicked: {}",
                    get_panic_message(payload)
                ))),
            };
            match result {
                Ok(outcome) => {
                    debug!("[{}] finished", task_name);
                    send_status(&status_tx, outcome.into_status(&task_name)).await;
                }
                Err(err) => {
                    error!("[{}] failed: {}", task_name, err);
                    send_status(&status_tx, failure_status(&task_name, &err)).await;
                    let _ = result_tx.send(err.for_package(&task_name)).await;
                }
            }
        });
    }
    drop(result_tx);

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Executor task did not complete: {}", e);
        }
    }

    collector.await.unwrap_or_else(|e| {
        error!("Result collector failed: {}", e);
        ErrorList::new()
    })
}

/// Drives lifecycle operations and keeps the state store in step.
#[derive(Debug, Clone)]
pub struct Executor {
    ctx: Arc<InstallContext>,
    state: Arc<State>,
    status_tx: mpsc::Sender<Status>,
    limit: usize,
}

impl Executor {
    pub fn new(ctx: InstallContext, state: Arc<State>, status_tx: mpsc::Sender<Status>) -> Self {
        Self {
            ctx: Arc::new(ctx),
            state,
            status_tx,
            limit: MAX_CONCURRENCY,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn context(&self) -> &InstallContext {
        &self.ctx
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Installs `packages`, recording each success. A failed install is rolled
    /// back before its error is reported.
    #[instrument(skip_all, fields(op = %Operation::Install, count = packages.len()))]
    pub async fn install(&self, packages: Vec<Package>) -> ErrorList {
        let ctx = Arc::clone(&self.ctx);
        let state = Arc::clone(&self.state);
        self.run(packages, move |pkg: Package| {
            let ctx = Arc::clone(&ctx);
            let state = Arc::clone(&state);
            async move {
                let result = async {
                    let outcome = install_package(&ctx, &pkg).await?;
                    state.add(&pkg)?;
                    Ok::<_, AfxError>(outcome)
                }
                .await;
                if result.is_err() {
                    rollback(&pkg);
                }
                result
            }
        })
        .await
    }

    /// Reinstalls `packages` at their configured version.
    #[instrument(skip_all, fields(op = %Operation::Update, count = packages.len()))]
    pub async fn update(&self, packages: Vec<Package>) -> ErrorList {
        let ctx = Arc::clone(&self.ctx);
        let state = Arc::clone(&self.state);
        self.run(packages, move |pkg: Package| {
            let ctx = Arc::clone(&ctx);
            let state = Arc::clone(&state);
            async move {
                let result = async {
                    uninstall_package(&pkg)?;
                    let outcome = install_package(&ctx, &pkg).await?;
                    state.update(&pkg)?;
                    Ok::<_, AfxError>(outcome)
                }
                .await;
                if result.is_err() {
                    rollback(&pkg);
                }
                result
            }
        })
        .await
    }

    #[instrument(skip_all, fields(op = %Operation::Check, count = packages.len()))]
    pub async fn check(&self, packages: Vec<Package>) -> ErrorList {
        let ctx = Arc::clone(&self.ctx);
        self.run(packages, move |pkg: Package| {
            let ctx = Arc::clone(&ctx);
            async move { check_package(&ctx, &pkg).await }
        })
        .await
    }

    /// Removes recorded resources that are no longer configured.
    #[instrument(skip_all, fields(op = %Operation::Uninstall, count = resources.len()))]
    pub async fn uninstall(&self, resources: Vec<Resource>) -> ErrorList {
        let state = Arc::clone(&self.state);
        let cancel = self.ctx.cancel.clone();
        dispatch(
            resources,
            self.limit,
            self.ctx.cancel.clone(),
            self.status_tx.clone(),
            |r: &Resource| r.name.clone(),
            move |resource: Resource| {
                let state = Arc::clone(&state);
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return Err(AfxError::Cancelled);
                    }
                    uninstall_resource(&resource)?;
                    state.remove(&resource.id)?;
                    Ok(Outcome::message("uninstalled"))
                }
            },
        )
        .await
    }

    async fn run<F, Fut>(&self, packages: Vec<Package>, op: F) -> ErrorList
    where
        F: Fn(Package) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome>> + Send + 'static,
    {
        dispatch(
            packages,
            self.limit,
            self.ctx.cancel.clone(),
            self.status_tx.clone(),
            |p: &Package| p.name().to_string(),
            op,
        )
        .await
    }
}

fn rollback(pkg: &Package) {
    debug!("[{}] rolling back", pkg.name());
    if let Err(e) = uninstall_package(pkg) {
        warn!("[{}] rollback left files behind: {}", pkg.name(), e);
    }
}

/// Forgets cached secrets after a failed run so the next run asks again.
pub fn after_run(errors: &ErrorList, cache_path: &Path) {
    if errors.is_empty() {
        return;
    }
    debug!("Run failed with {} errors, clearing env cache", errors.len());
    if let Err(e) = env::refresh_cache(cache_path) {
        warn!("Could not delete env cache {}: {}", cache_path.display(), e);
    }
}
