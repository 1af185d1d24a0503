// afx/src/cli/show.rs
use afx_common::config::Config;
use afx_common::error::Result;
use afx_common::Package;
use afx_core::ChangeSets;
use clap::Args;
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};

use super::runner::Session;

/// Lists configured packages and what the next run would do with them.
#[derive(Debug, Args)]
pub struct ShowArgs;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    kind: String,
    status: &'static str,
}

impl Entry {
    fn of(pkg: &Package, status: &'static str) -> Self {
        Self {
            name: pkg.name().to_string(),
            kind: pkg.package_type().label().to_string(),
            status,
        }
    }

    fn style(&self) -> &'static str {
        match self.status {
            "installed" => "Fg",
            "not installed" | "broken" => "Fy",
            "outdated" => "Fc",
            _ => "Fr",
        }
    }
}

fn entries(sets: &ChangeSets) -> Vec<Entry> {
    let mut out: Vec<Entry> = sets
        .no_changes
        .iter()
        .map(|p| Entry::of(p, "installed"))
        .chain(sets.additions.iter().map(|p| Entry::of(p, "not installed")))
        .chain(sets.readditions.iter().map(|p| Entry::of(p, "broken")))
        .chain(sets.changes.iter().map(|p| Entry::of(p, "outdated")))
        .chain(sets.deletions.iter().map(|r| Entry {
            name: r.name.clone(),
            kind: r.resource_type.clone(),
            status: "unconfigured",
        }))
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

impl ShowArgs {
    pub fn run(&self, config: &Config) -> Result<()> {
        let session = Session::open(config)?;
        let entries = entries(session.state.change_sets());
        if entries.is_empty() {
            println!("{}", "No packages configured".yellow());
            return Ok(());
        }

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        table.add_row(Row::new(vec![
            Cell::new("Name").style_spec("b"),
            Cell::new("Type").style_spec("b"),
            Cell::new("Status").style_spec("b"),
        ]));
        for entry in &entries {
            table.add_row(Row::new(vec![
                Cell::new(&entry.name).style_spec("Fb"),
                Cell::new(&entry.kind),
                Cell::new(entry.status).style_spec(entry.style()),
            ]));
        }
        table.printstd();
        println!("{}", format!("{} packages", entries.len()).bold());
        Ok(())
    }
}
