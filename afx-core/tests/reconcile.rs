// afx-core/tests/reconcile.rs
mod common;

use std::fs;
use std::sync::Arc;

use afx_common::manifest::Manifest;
use afx_common::{Config, Package};
use afx_core::{Executor, State};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn packages(config: &Config, yaml: &str) -> Vec<Package> {
    Manifest::parse(yaml).unwrap().into_packages(config).unwrap()
}

const REPO: &str = r#"
github:
  - name: fzf
    owner: junegunn
    repo: fzf
"#;

fn release(tag: &str) -> String {
    format!(
        r#"
github:
  - name: gh
    owner: cli
    repo: cli
    release:
      name: gh
      tag: {tag}
"#
    )
}

fn pretend_installed(state: &State, pkg: &Package) {
    fs::create_dir_all(pkg.home()).unwrap();
    state.add(pkg).unwrap();
}

#[test]
fn new_package_is_an_addition_until_recorded() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::with_root(tmp.path());
    let pkgs = packages(&config, REPO);

    let state = State::open(&config.state_file(), &pkgs).unwrap();
    assert_eq!(state.additions().len(), 1);
    assert!(state.change_sets().readditions.is_empty());
    assert!(!state.change_sets().is_empty());
    pretend_installed(&state, &pkgs[0]);

    let state = State::open(&config.state_file(), &pkgs).unwrap();
    assert!(state.change_sets().is_empty());
    assert_eq!(state.no_changes().len(), 1);
    assert_eq!(state.list().unwrap(), vec!["github.com/junegunn/fzf".to_string()]);
}

#[test]
fn bumped_release_tag_is_a_change() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::with_root(tmp.path());
    let v1 = packages(&config, &release("v1.0.0"));
    let state = State::open(&config.state_file(), &v1).unwrap();
    pretend_installed(&state, &v1[0]);

    let v2 = packages(&config, &release("v2.0.0"));
    let state = State::open(&config.state_file(), &v2).unwrap();
    assert_eq!(state.changes().len(), 1);
    assert!(state.additions().is_empty());
    assert_eq!(state.get(&v2[0].id()).unwrap().unwrap().version, "v1.0.0");

    state.update(&v2[0]).unwrap();
    let state = State::open(&config.state_file(), &v2).unwrap();
    assert!(state.change_sets().is_empty());
}

#[test]
fn missing_home_is_a_readdition() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::with_root(tmp.path());
    let pkgs = packages(&config, REPO);
    let state = State::open(&config.state_file(), &pkgs).unwrap();
    pretend_installed(&state, &pkgs[0]);

    fs::remove_dir_all(pkgs[0].home()).unwrap();
    let state = State::open(&config.state_file(), &pkgs).unwrap();
    assert_eq!(state.readditions().len(), 1);
    assert!(state.changes().is_empty());
    assert_eq!(state.to_install().len(), 1);
}

#[tokio::test]
async fn unconfigured_record_is_deleted_from_disk_and_state() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::with_root(tmp.path());
    let pkgs = packages(&config, REPO);
    let state = State::open(&config.state_file(), &pkgs).unwrap();
    pretend_installed(&state, &pkgs[0]);
    fs::write(pkgs[0].home().join("README.md"), "fzf").unwrap();

    let state = Arc::new(State::open(&config.state_file(), &[]).unwrap());
    assert_eq!(state.deletions().len(), 1);

    let (tx, mut rx) = mpsc::channel::<afx_common::Status>(1);
    let collector = tokio::spawn(async move {
        let mut names = Vec::new();
        while let Some(status) = rx.recv().await {
            names.push((status.name, status.message));
        }
        names
    });
    let executor = Executor::new(
        common::context(&config, CancellationToken::new()),
        Arc::clone(&state),
        tx,
    );
    let errors = executor.uninstall(state.deletions().to_vec()).await;
    drop(executor);

    assert!(errors.is_empty());
    assert_eq!(
        collector.await.unwrap(),
        vec![("fzf".to_string(), "uninstalled".to_string())]
    );
    assert!(!pkgs[0].home().exists());
    assert!(State::open(&config.state_file(), &[]).unwrap().list().unwrap().is_empty());
}

#[test]
fn reopening_unchanged_state_is_stable() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::with_root(tmp.path());
    let yaml = format!("{REPO}{}", release("v1.0.0").replace("github:\n", ""));
    let pkgs = packages(&config, &yaml);
    assert_eq!(pkgs.len(), 2);

    let state = State::open(&config.state_file(), &pkgs).unwrap();
    for pkg in &pkgs {
        pretend_installed(&state, pkg);
    }
    drop(state);

    let first = State::open(&config.state_file(), &pkgs).unwrap();
    let first_bytes = fs::read(config.state_file()).unwrap();
    let second = State::open(&config.state_file(), &pkgs).unwrap();
    let second_bytes = fs::read(config.state_file()).unwrap();

    assert_eq!(first_bytes, second_bytes);
    assert_eq!(first.resources().unwrap(), second.resources().unwrap());
    assert_eq!(second.no_changes().len(), 2);
}

#[test]
fn corrupt_state_file_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::with_root(tmp.path());
    fs::create_dir_all(config.afx_root()).unwrap();
    fs::write(config.state_file(), "{ not json").unwrap();

    let err = State::open(&config.state_file(), &[]).unwrap_err();
    assert!(matches!(err, afx_common::AfxError::State(_)));
}
