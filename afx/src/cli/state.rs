// afx/src/cli/state.rs
use afx_common::config::Config;
use afx_common::error::Result;
use clap::{Args, Subcommand};

use super::runner::Session;

/// Inspects or repairs the state file.
#[derive(Debug, Args)]
pub struct StateArgs {
    #[command(subcommand)]
    command: StateCommand,
}

#[derive(Debug, Subcommand)]
enum StateCommand {
    /// Print the IDs of every recorded package
    List,
    /// Sync records with the configured packages
    Refresh {
        /// Rebuild the state from the configuration, discarding every record
        #[arg(long)]
        force: bool,
    },
}

impl StateArgs {
    pub fn run(&self, config: &Config) -> Result<()> {
        let session = Session::open(config)?;
        match self.command {
            StateCommand::List => {
                for id in session.state.list()? {
                    println!("{id}");
                }
            }
            StateCommand::Refresh { force: true } => session.state.reset()?,
            StateCommand::Refresh { force: false } => session.state.refresh()?,
        }
        Ok(())
    }
}
