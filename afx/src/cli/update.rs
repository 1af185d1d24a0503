// afx/src/cli/update.rs
use afx_common::config::Config;
use afx_common::error::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::runner::{self, Session};

/// Reinstalls packages whose configured release changed.
#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Only update these packages
    names: Vec<String>,
}

impl UpdateArgs {
    #[instrument(skip(self, config, cancel), fields(targets = ?self.names))]
    pub async fn run(&self, config: &Config, cancel: CancellationToken) -> Result<()> {
        let session = Session::open(config)?;
        let targets =
            runner::select(session.state.changes().to_vec(), &session.packages, &self.names)?;
        if targets.is_empty() {
            println!("No packages to update");
            return Ok(());
        }

        let ctx = session.context(cancel)?;
        runner::execute(&session, ctx, runner::names(&targets), |executor| async move {
            executor.update(targets).await
        })
        .await
    }
}
