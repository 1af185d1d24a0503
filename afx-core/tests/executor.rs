// afx-core/tests/executor.rs
mod common;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use afx_common::error::AfxError;
use afx_common::{Config, Outcome, Status};
use afx_core::{after_run, dispatch, Executor, State, MAX_CONCURRENCY};
use common::{context, http_package, http_package_with_output, serve, Reply};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn drain(mut rx: mpsc::Receiver<Status>) -> tokio::task::JoinHandle<Vec<Status>> {
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(status) = rx.recv().await {
            seen.push(status);
        }
        seen
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispatch_never_exceeds_the_concurrency_cap() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel::<Status>(1);
    let statuses = drain(rx);

    let targets: Vec<usize> = (0..20).collect();
    let (current, max) = (Arc::clone(&in_flight), Arc::clone(&peak));
    let errors = dispatch(
        targets,
        MAX_CONCURRENCY,
        CancellationToken::new(),
        tx,
        |n: &usize| format!("pkg-{n}"),
        move |_n: usize| {
            let current = Arc::clone(&current);
            let max = Arc::clone(&max);
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(Outcome::message("done"))
            }
        },
    )
    .await;

    assert!(errors.is_empty());
    assert!(peak.load(Ordering::SeqCst) <= MAX_CONCURRENCY);
    assert!(peak.load(Ordering::SeqCst) > 1);
    let statuses = statuses.await.unwrap();
    assert_eq!(statuses.len(), 20);
    assert!(statuses.iter().all(|s| s.done && !s.err));
}

#[tokio::test]
async fn dispatch_reports_failures_and_panics_once_each() {
    let (tx, rx) = mpsc::channel::<Status>(1);
    let statuses = drain(rx);

    let errors = dispatch(
        vec![0usize, 1, 2],
        4,
        CancellationToken::new(),
        tx,
        |n: &usize| format!("pkg-{n}"),
        |n: usize| async move {
            match n {
                0 => Ok(Outcome::message("ok")),
                1 => Err(AfxError::Generic("boom".to_string())),
                _ => panic!("exploded"),
            }
        },
    )
    .await;

    assert_eq!(errors.len(), 2);
    let statuses = statuses.await.unwrap();
    assert_eq!(statuses.len(), 3);
    assert_eq!(statuses.iter().filter(|s| s.err).count(), 2);
    assert!(errors.errors().iter().any(|e| e.to_string().contains("exploded")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_keeps_completed_installs_and_clears_env_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::with_root(tmp.path());
    std::fs::create_dir_all(config.afx_root()).unwrap();
    std::fs::write(config.cache_file(), "{}").unwrap();

    let (addr, _hits) = serve(|n| if n < 2 { Reply::Body("hello") } else { Reply::Stall }).await;
    let packages: Vec<_> = (0..10)
        .map(|i| http_package(&config, addr, &format!("tool-{i}")))
        .collect();

    let state = Arc::new(State::open(&config.state_file(), &packages).unwrap());
    assert_eq!(state.additions().len(), 10);

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel::<Status>(1);
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        let mut seen = Vec::new();
        let mut succeeded = 0;
        while let Some(status) = rx.recv().await {
            if !status.err {
                succeeded += 1;
                if succeeded == 2 {
                    trigger.cancel();
                }
            }
            seen.push(status);
        }
        seen
    });

    let executor = Executor::new(context(&config, cancel.clone()), Arc::clone(&state), tx);
    let to_install = state.to_install();
    let errors = tokio::time::timeout(Duration::from_secs(30), executor.install(to_install))
        .await
        .expect("install did not stop after cancellation");
    drop(executor);

    let statuses = watcher.await.unwrap();
    assert_eq!(statuses.len(), 10);
    // Every stalled download reports the same cancellation, collapsed into one entry.
    assert!(errors.has_cancelled());
    assert!(errors.errors()[0].is_cancelled());
    assert_eq!(statuses.iter().filter(|s| s.err).count(), 8);

    let reopened = State::open(&config.state_file(), &packages).unwrap();
    assert_eq!(reopened.list().unwrap().len(), 2);
    assert_eq!(reopened.no_changes().len(), 2);
    assert_eq!(reopened.additions().len(), 8);
    for pkg in reopened.additions() {
        assert!(!pkg.home().exists(), "{} was not rolled back", pkg.name());
    }

    after_run(&errors, &config.cache_file());
    assert!(!config.cache_file().exists());
}

#[tokio::test]
async fn failed_install_is_rolled_back_and_not_recorded() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::with_root(tmp.path());
    let (addr, _hits) = serve(|_| Reply::NotFound).await;
    let pkg = http_package(&config, addr, "missing");

    let state = Arc::new(State::open(&config.state_file(), &[pkg.clone()]).unwrap());
    let (tx, rx) = mpsc::channel::<Status>(1);
    let statuses = drain(rx);
    let executor = Executor::new(context(&config, CancellationToken::new()), Arc::clone(&state), tx);

    let errors = executor.install(state.to_install()).await;
    drop(executor);

    assert_eq!(errors.len(), 1);
    assert!(errors.errors()[0].to_string().starts_with("missing:"));
    assert!(!pkg.home().exists());
    assert!(state.get(&pkg.id()).unwrap().is_none());
    let statuses = statuses.await.unwrap();
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].err);
}

#[tokio::test]
async fn failed_install_with_output_only_removes_its_own_home() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::with_root(tmp.path());
    let user_bin = tmp.path().join("userbin");
    std::fs::create_dir_all(&user_bin).unwrap();
    std::fs::write(user_bin.join("my-script"), "#!/bin/sh").unwrap();

    let (addr, _hits) = serve(|_| Reply::NotFound).await;
    let neighbour = http_package(&config, addr, "neighbour");
    std::fs::create_dir_all(neighbour.home()).unwrap();
    std::fs::write(neighbour.home().join("payload.txt"), "keep").unwrap();

    let pkg = http_package_with_output(&config, addr, "tool", Some("bin/tool"));
    assert!(pkg.home().starts_with(config.afx_root()));

    let state = Arc::new(State::open(&config.state_file(), &[pkg.clone()]).unwrap());
    let (tx, rx) = mpsc::channel::<Status>(1);
    let statuses = drain(rx);
    let executor = Executor::new(context(&config, CancellationToken::new()), Arc::clone(&state), tx);
    let errors = executor.install(state.to_install()).await;
    drop(executor);
    statuses.await.unwrap();

    assert_eq!(errors.len(), 1);
    assert!(!pkg.home().exists());
    assert!(user_bin.join("my-script").exists());
    assert!(neighbour.home().join("payload.txt").exists());
}

#[tokio::test]
async fn output_names_the_file_inside_the_home() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::with_root(tmp.path());
    let (addr, _hits) = serve(|_| Reply::Body("echo hi")).await;
    let pkg = http_package_with_output(&config, addr, "greet", Some("bin/greet.sh"));

    let state = Arc::new(State::open(&config.state_file(), &[pkg.clone()]).unwrap());
    let (tx, rx) = mpsc::channel::<Status>(1);
    let statuses = drain(rx);
    let executor = Executor::new(context(&config, CancellationToken::new()), Arc::clone(&state), tx);
    assert!(executor.install(state.to_install()).await.is_empty());
    drop(executor);
    statuses.await.unwrap();

    assert_eq!(
        std::fs::read_to_string(pkg.home().join("bin/greet.sh")).unwrap(),
        "echo hi"
    );
    assert!(!pkg.home().join("payload.txt").exists());
}

#[tokio::test]
async fn install_records_paths_then_uninstall_removes_them() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::with_root(tmp.path());
    let (addr, _hits) = serve(|_| Reply::Body("payload")).await;
    let pkg = http_package(&config, addr, "notes");

    let state = Arc::new(State::open(&config.state_file(), &[pkg.clone()]).unwrap());
    let (tx, rx) = mpsc::channel::<Status>(1);
    let statuses = drain(rx);
    let executor = Executor::new(context(&config, CancellationToken::new()), Arc::clone(&state), tx);
    assert!(executor.install(state.to_install()).await.is_empty());
    drop(executor);
    assert_eq!(statuses.await.unwrap().len(), 1);

    let recorded = State::open(&config.state_file(), &[pkg.clone()])
        .unwrap()
        .get(&pkg.id())
        .unwrap()
        .expect("install was not recorded");
    assert!(!recorded.paths.is_empty());
    for path in &recorded.paths {
        assert!(Path::new(path).exists(), "{path} is missing");
    }
    assert_eq!(
        std::fs::read_to_string(pkg.home().join("payload.txt")).unwrap(),
        "payload"
    );

    // Dropping the package from the configuration turns the record into a deletion.
    let state = Arc::new(State::open(&config.state_file(), &[]).unwrap());
    assert_eq!(state.deletions().len(), 1);
    let (tx, rx) = mpsc::channel::<Status>(1);
    let statuses = drain(rx);
    let executor = Executor::new(context(&config, CancellationToken::new()), Arc::clone(&state), tx);
    assert!(executor.uninstall(state.deletions().to_vec()).await.is_empty());
    drop(executor);
    assert_eq!(statuses.await.unwrap().len(), 1);

    let reopened = State::open(&config.state_file(), &[]).unwrap();
    assert!(reopened.list().unwrap().is_empty());
    for path in &recorded.paths {
        assert!(!Path::new(path).exists(), "{path} survived");
    }
}
