// afx/src/cli/status.rs
//! Live progress for executor runs: one permanent line per finished package
//! and a dimmed summary of what is still pending.
use std::collections::HashSet;
use std::io::{self, Write};

use afx_common::Status;
use colored::*;
use terminal_size::{terminal_size, Width};
use tokio::sync::mpsc;
use tracing::debug;

const DEFAULT_WIDTH: usize = 80;
const CLEAR_LINE: &str = "\r\x1b[2K";

fn terminal_width() -> usize {
    match terminal_size() {
        Some((Width(w), _)) if w > 0 => w as usize,
        _ => DEFAULT_WIDTH,
    }
}

/// `"<n> remaining | a, b, …"`, cut to fit `width`.
pub(crate) fn remaining_summary(pending: &[&str], width: usize) -> String {
    let line = format!("{} remaining | {}", pending.len(), pending.join(", "));
    let max = width.saturating_sub(4);
    if line.chars().count() <= max {
        return line;
    }
    let mut cut: String = line.chars().take(max).collect();
    cut.push('…');
    cut
}

struct StatusDisplay<W: Write> {
    out: W,
    order: Vec<String>,
    finished: HashSet<String>,
    total: usize,
    done: usize,
    width: usize,
}

impl<W: Write> StatusDisplay<W> {
    fn new(out: W, names: Vec<String>, width: usize) -> Self {
        Self {
            out,
            total: names.len(),
            order: names,
            finished: HashSet::new(),
            done: 0,
            width,
        }
    }

    fn is_finished(&self) -> bool {
        self.done >= self.total
    }

    fn pending(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|name| !self.finished.contains(*name))
            .map(String::as_str)
            .collect()
    }

    fn handle(&mut self, status: Status) -> io::Result<()> {
        if !status.done {
            return Ok(());
        }
        if self.finished.insert(status.name.clone()) {
            self.done += 1;
        } else {
            debug!("Duplicate status for {}", status.name);
        }

        write!(self.out, "{CLEAR_LINE}")?;
        if !status.hidden {
            let mark = if status.err {
                "✖".red()
            } else {
                "✔".green()
            };
            let message = if status.err {
                status.message.red()
            } else if status.no_color {
                status.message.normal()
            } else {
                status.message.dimmed()
            };
            writeln!(self.out, "{} {} {}", mark, status.name.bold(), message)?;
        }

        let pending = self.pending();
        if !pending.is_empty() {
            write!(
                self.out,
                "{}",
                remaining_summary(&pending, self.width).dimmed()
            )?;
        }
        self.out.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        write!(self.out, "{CLEAR_LINE}")?;
        self.out.flush()
    }
}

/// Renders statuses until every package reported or the senders are gone.
pub async fn handle_events(names: Vec<String>, mut status_rx: mpsc::Receiver<Status>) {
    let mut renderer = StatusDisplay::new(io::stdout(), names, terminal_width());
    while !renderer.is_finished() {
        let Some(status) = status_rx.recv().await else {
            let pending = renderer.pending().len();
            debug!("Status channel closed with {} pending", pending);
            break;
        };
        if let Err(e) = renderer.handle(status) {
            debug!("Failed to write progress: {}", e);
        }
    }
    let _ = renderer.close();
}
