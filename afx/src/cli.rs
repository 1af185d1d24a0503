// afx/src/cli.rs
//! Defines the command-line argument structure using clap.
use afx_common::error::Result;
use afx_common::Config;
use clap::{ArgAction, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

pub mod check;
pub mod completion;
pub mod init;
pub mod install;
pub mod runner;
pub mod show;
pub mod state;
pub mod status;
pub mod uninstall;
pub mod update;

use crate::cli::check::CheckArgs;
use crate::cli::completion::CompletionArgs;
use crate::cli::init::InitArgs;
use crate::cli::install::InstallArgs;
use crate::cli::show::ShowArgs;
use crate::cli::state::StateArgs;
use crate::cli::uninstall::UninstallArgs;
use crate::cli::update::UpdateArgs;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "afx", bin_name = "afx")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Install(InstallArgs),
    Update(UpdateArgs),
    Check(CheckArgs),
    #[command(alias = "remove")]
    Uninstall(UninstallArgs),
    Show(ShowArgs),
    Init(InitArgs),
    State(StateArgs),
    Completion(CompletionArgs),
}

impl Command {
    pub async fn run(&self, config: &Config, cancel: CancellationToken) -> Result<()> {
        match self {
            Self::Install(command) => command.run(config, cancel).await,
            Self::Update(command) => command.run(config, cancel).await,
            Self::Check(command) => command.run(config, cancel).await,
            Self::Uninstall(command) => command.run(config, cancel).await,
            Self::Show(command) => command.run(config),
            Self::Init(command) => command.run(config),
            Self::State(command) => command.run(config),
            Self::Completion(command) => {
                command.run();
                Ok(())
            }
        }
    }
}
