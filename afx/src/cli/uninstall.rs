// afx/src/cli/uninstall.rs
use std::io::IsTerminal;

use afx_common::config::Config;
use afx_common::error::{AfxError, Result};
use afx_common::Resource;
use clap::Args;
use colored::Colorize;
use dialoguer::Confirm;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::runner::{self, Session};

/// Removes installed packages that are no longer configured.
#[derive(Debug, Args)]
pub struct UninstallArgs {
    /// Do not ask for confirmation
    #[arg(short, long)]
    yes: bool,
}

impl UninstallArgs {
    #[instrument(skip_all)]
    pub async fn run(&self, config: &Config, cancel: CancellationToken) -> Result<()> {
        let session = Session::open(config)?;
        let targets = session.state.deletions().to_vec();
        if targets.is_empty() {
            println!("No packages to uninstall");
            return Ok(());
        }

        for resource in &targets {
            println!("  {} {}", "-".red(), resource.name.bold());
            debug!("{} -> {}", resource.id, resource.home);
        }
        if !self.confirmed(targets.len())? {
            println!("Cancelled");
            return Ok(());
        }

        let names: Vec<String> = targets.iter().map(|r: &Resource| r.name.clone()).collect();
        let ctx = session.offline_context(cancel)?;
        runner::execute(&session, ctx, names, |executor| async move {
            executor.uninstall(targets).await
        })
        .await
    }

    fn confirmed(&self, count: usize) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }
        if !std::io::stdin().is_terminal() {
            return Err(AfxError::Prompt(
                "stdin is not a terminal, pass --yes to uninstall".to_string(),
            ));
        }
        Confirm::new()
            .with_prompt(format!("Uninstall {count} packages?"))
            .default(false)
            .interact()
            .map_err(|_| AfxError::Prompt("prompt cancelled".to_string()))
    }
}
