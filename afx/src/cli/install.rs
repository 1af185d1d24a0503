// afx/src/cli/install.rs
use afx_common::config::Config;
use afx_common::error::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::runner::{self, Session};

/// Installs packages that are new or broken.
#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Only install these packages
    names: Vec<String>,
}

impl InstallArgs {
    #[instrument(skip(self, config, cancel), fields(targets = ?self.names))]
    pub async fn run(&self, config: &Config, cancel: CancellationToken) -> Result<()> {
        let session = Session::open(config)?;
        let targets =
            runner::select(session.state.to_install(), &session.packages, &self.names)?;
        if targets.is_empty() {
            println!("No packages to install");
            return Ok(());
        }

        let ctx = session.context(cancel)?;
        runner::execute(&session, ctx, runner::names(&targets), |executor| async move {
            executor.install(targets).await
        })
        .await
    }
}
