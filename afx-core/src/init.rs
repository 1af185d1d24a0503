// afx-core/src/init.rs
//! Shell code that loads installed packages into an interactive shell.
use std::collections::BTreeMap;
use std::fmt::Write;

use afx_common::Package;

use crate::install::{self, plugin};

fn exports(out: &mut String, env: &BTreeMap<String, String>) {
    for (key, value) in env {
        let _ = writeln!(out, "export {key}=\"{value}\"");
    }
}

/// Shell source for one package.
pub fn init_script(pkg: &Package) -> String {
    let mut out = String::new();
    if !install::installed(pkg) {
        let _ = writeln!(out, "# {} is not installed, run 'afx install'", pkg.name());
        return out;
    }

    if let Some(p) = pkg.plugin() {
        exports(&mut out, &p.env);
        for source in plugin::sources(pkg, p) {
            let _ = writeln!(out, "source {}", source.display());
        }
        for script in &p.load.scripts {
            let _ = writeln!(out, "{script}");
        }
    }

    if let Some(c) = pkg.command() {
        exports(&mut out, &c.env);
        for (name, value) in &c.alias {
            let _ = writeln!(out, "alias {name}='{value}'");
        }
        if let Some(snippet) = c.snippet.as_deref().filter(|s| !s.trim().is_empty()) {
            out.push_str(snippet);
            if !snippet.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    out
}

/// Shell source for every package, in configuration order.
pub fn init_all(packages: &[Package]) -> String {
    packages.iter().map(init_script).collect()
}
