// afx-core/src/install/command.rs
use afx_aio::fs as afx_fs;
use afx_aio::process::run_build_step;
use afx_common::error::{AfxError, Result};
use afx_common::model::Command;
use afx_common::Package;
use tracing::{debug, error};

use crate::context::InstallContext;

/// Runs the build steps, then materialises every link.
pub async fn install(ctx: &InstallContext, pkg: &Package, command: &Command) -> Result<()> {
    if let Some(build) = &command.build {
        for step in &build.steps {
            if ctx.is_cancelled() {
                return Err(AfxError::Cancelled);
            }
            debug!("[{}] build: {}", pkg.name(), step);
            run_build_step(
                step,
                pkg.home(),
                &build.env,
                ctx.sudo_password.as_deref(),
                &ctx.cancel,
            )
            .await?;
        }
    }
    link(pkg, command)
}

fn link(pkg: &Package, command: &Command) -> Result<()> {
    for link in &command.link {
        let matches = pkg.glob(&link.from);
        let source = match matches.as_slice() {
            [] => {
                error!(
                    "{}: '{}' matched nothing under {}, skipping link",
                    pkg.name(),
                    link.from,
                    pkg.home().display()
                );
                continue;
            }
            [source] => source,
            many => {
                return Err(AfxError::Link(format!(
                    "'{}' matched {} files, expected one: {:?}",
                    link.from,
                    many.len(),
                    many
                )))
            }
        };
        afx_fs::ensure_executable(source)?;
        let dest = pkg.link_destination(link, Some(source.as_path()));
        debug!("[{}] link {} -> {}", pkg.name(), dest.display(), source.display());
        afx_fs::create_symlink(source, &dest)?;
    }
    Ok(())
}

/// Every link resolves to exactly one source and its destination exists.
pub fn installed(pkg: &Package, command: &Command) -> bool {
    command.link.iter().all(|link| match pkg.glob(&link.from).as_slice() {
        [source] => afx_fs::path_exists(&pkg.link_destination(link, Some(source.as_path()))),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use afx_common::model::{Build, Gist, Link};
    use afx_common::{Config, PackageKind};
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn ctx(config: &Config) -> InstallContext {
        InstallContext::new(
            config.clone(),
            reqwest::Client::new(),
            None,
            None,
            CancellationToken::new(),
        )
    }

    fn pkg(config: &Config, command: Command) -> Package {
        Package::new(
            PackageKind::Gist(Gist {
                name: "tools".to_string(),
                owner: "o".to_string(),
                id: "1".to_string(),
                description: String::new(),
                plugin: None,
                command: Some(command),
                depends_on: Vec::new(),
            }),
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn links_single_match_and_skips_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_root(tmp.path());
        let command = Command {
            link: vec![
                Link {
                    from: "dist/tool-*".to_string(),
                    to: "tool".to_string(),
                },
                Link {
                    from: "nothing-here".to_string(),
                    to: String::new(),
                },
            ],
            ..Default::default()
        };
        let pkg = pkg(&config, command.clone());
        fs::create_dir_all(pkg.home().join("dist")).unwrap();
        fs::write(pkg.home().join("dist/tool-linux"), "#!/bin/sh\n").unwrap();

        install(&ctx(&config), &pkg, &command).await.unwrap();
        let dest = tmp.path().join("bin/tool");
        assert_eq!(fs::read_link(&dest).unwrap(), pkg.home().join("dist/tool-linux"));
        assert!(afx_fs::is_executable(&pkg.home().join("dist/tool-linux")));
    }

    #[tokio::test]
    async fn ambiguous_glob_is_a_link_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_root(tmp.path());
        let command = Command {
            link: vec![Link {
                from: "tool-*".to_string(),
                to: String::new(),
            }],
            ..Default::default()
        };
        let pkg = pkg(&config, command.clone());
        fs::create_dir_all(pkg.home()).unwrap();
        fs::write(pkg.home().join("tool-a"), "").unwrap();
        fs::write(pkg.home().join("tool-b"), "").unwrap();

        let err = install(&ctx(&config), &pkg, &command).await.unwrap_err();
        assert!(matches!(err, AfxError::Link(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn build_steps_run_in_home_with_env() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_root(tmp.path());
        let mut env = std::collections::BTreeMap::new();
        env.insert("GREETING".to_string(), "hello".to_string());
        let command = Command {
            build: Some(Build {
                env,
                steps: vec!["sh -c 'echo $GREETING > built.txt'".to_string()],
            }),
            link: vec![Link {
                from: "built.txt".to_string(),
                to: String::new(),
            }],
            ..Default::default()
        };
        let pkg = pkg(&config, command.clone());
        fs::create_dir_all(pkg.home()).unwrap();

        install(&ctx(&config), &pkg, &command).await.unwrap();
        assert_eq!(fs::read_to_string(pkg.home().join("built.txt")).unwrap().trim(), "hello");
        assert!(installed(&pkg, &command));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_step_aborts_before_linking() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_root(tmp.path());
        let command = Command {
            build: Some(Build {
                env: Default::default(),
                steps: vec!["sh -c 'echo boom >&2; exit 3'".to_string()],
            }),
            link: vec![Link {
                from: "*".to_string(),
                to: String::new(),
            }],
            ..Default::default()
        };
        let pkg = pkg(&config, command.clone());
        fs::create_dir_all(pkg.home()).unwrap();

        let err = install(&ctx(&config), &pkg, &command).await.unwrap_err();
        assert!(matches!(err, AfxError::Build(ref msg) if msg == "boom"));
        assert!(!tmp.path().join("bin").exists());
    }
}
