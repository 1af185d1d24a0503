// afx-core/src/install/plugin.rs
use afx_common::model::Plugin;
use afx_common::Package;
use tracing::debug;

/// Plugin files are sourced in place, so there is nothing to copy.
pub fn install(pkg: &Package, plugin: &Plugin) {
    debug!(
        "[{}] plugin sources used in place: {:?}",
        pkg.name(),
        plugin.sources
    );
}

/// Every source pattern matches at least one file under the home.
pub fn installed(pkg: &Package, plugin: &Plugin) -> bool {
    plugin
        .sources
        .iter()
        .all(|pattern| pkg.glob(pattern).iter().any(|p| p.is_file()))
}

/// Files to `source`, in declaration order.
pub fn sources(pkg: &Package, plugin: &Plugin) -> Vec<std::path::PathBuf> {
    plugin
        .sources
        .iter()
        .flat_map(|pattern| pkg.glob(pattern))
        .filter(|p| p.is_file())
        .collect()
}
