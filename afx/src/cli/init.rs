// afx/src/cli/init.rs
use afx_common::config::Config;
use afx_common::error::Result;
use afx_common::manifest;
use clap::Args;

/// Prints shell code that loads installed packages, for `source <(afx init)`.
#[derive(Debug, Args)]
pub struct InitArgs;

impl InitArgs {
    pub fn run(&self, config: &Config) -> Result<()> {
        let packages = manifest::load_packages(config)?;
        print!("{}", afx_core::init::init_all(&packages));
        Ok(())
    }
}
