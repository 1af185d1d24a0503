// afx/src/cli/completion.rs
use std::io;

use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};

use crate::cli::CliArgs;

/// Prints a shell completion script.
#[derive(Debug, Args)]
pub struct CompletionArgs {
    #[arg(value_parser = ["bash", "zsh", "fish"])]
    shell: String,
}

impl CompletionArgs {
    pub fn run(&self) {
        let shell = match self.shell.as_str() {
            "zsh" => Shell::Zsh,
            "fish" => Shell::Fish,
            _ => Shell::Bash,
        };
        let mut command = CliArgs::command();
        generate(shell, &mut command, "afx", &mut io::stdout());
    }
}
