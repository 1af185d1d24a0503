// afx/src/cli/check.rs
use afx_common::config::Config;
use afx_common::error::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::runner::{self, Session};

/// Looks for newer releases of installed packages.
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Only check these packages
    names: Vec<String>,
}

impl CheckArgs {
    #[instrument(skip(self, config, cancel), fields(targets = ?self.names))]
    pub async fn run(&self, config: &Config, cancel: CancellationToken) -> Result<()> {
        let session = Session::open(config)?;
        let targets = runner::select(session.packages.clone(), &session.packages, &self.names)?;
        if targets.is_empty() {
            println!("No packages to check");
            return Ok(());
        }

        let ctx = session.context(cancel)?;
        runner::execute(&session, ctx, runner::names(&targets), |executor| async move {
            executor.check(targets).await
        })
        .await
    }
}
