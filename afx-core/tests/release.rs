// afx-core/tests/release.rs
mod common;

use std::fs::File;
use std::net::SocketAddr;
use std::sync::Arc;

use afx_common::model::{AssetFilter, Command, GitHub, Link, Release};
use afx_common::{Config, Package, PackageKind, Status};
use afx_core::{Executor, State};
use common::{context, serve_routes};
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const TAG: &str = "v1.2.0";

fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("bundle.tar.gz");
    let encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
    std::fs::read(path).unwrap()
}

fn release_json(addr: SocketAddr, assets: &[&str]) -> Vec<u8> {
    let assets: Vec<String> = assets
        .iter()
        .map(|name| {
            format!(r#"{{"name":"{name}","browser_download_url":"http://{addr}/download/{name}"}}"#)
        })
        .collect();
    format!(r#"{{"tag_name":"{TAG}","assets":[{}]}}"#, assets.join(",")).into_bytes()
}

fn release_package(config: &Config, name: &str, filename: &str, link: Option<&str>) -> Package {
    let gh = GitHub {
        name: name.to_string(),
        owner: "acme".to_string(),
        repo: name.to_string(),
        branch: None,
        with: None,
        description: String::new(),
        release: Some(Release {
            name: name.to_string(),
            tag: TAG.to_string(),
            asset: Some(AssetFilter {
                filename: filename.to_string(),
                replacements: Default::default(),
            }),
        }),
        plugin: None,
        command: link.map(|from| Command {
            link: vec![Link {
                from: from.to_string(),
                to: String::new(),
            }],
            ..Default::default()
        }),
        depends_on: Vec::new(),
    };
    Package::new(PackageKind::GitHub(gh), config).unwrap()
}

async fn install(config: &Config, pkg: &Package) -> (Vec<Status>, Arc<State>) {
    let state = Arc::new(State::open(&config.state_file(), &[pkg.clone()]).unwrap());
    let (tx, mut rx) = mpsc::channel::<Status>(1);
    let collector = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(status) = rx.recv().await {
            seen.push(status);
        }
        seen
    });
    let executor = Executor::new(
        context(config, CancellationToken::new()),
        Arc::clone(&state),
        tx,
    );
    let errors = executor.install(state.to_install()).await;
    drop(executor);
    assert!(errors.is_empty(), "{errors}");
    (collector.await.unwrap(), state)
}

#[tokio::test]
async fn release_archive_is_extracted_linked_and_recorded() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = Config::with_root(tmp.path());
    let wanted = format!("tool_{TAG}_custom.tar.gz");
    let addr = serve_routes(|addr| {
        vec![
            (
                "/repos/acme/tool/releases/tags/v1.2.0".to_string(),
                release_json(
                    addr,
                    &["tool_v1.2.0_other.zip", wanted.as_str(), "checksums.txt"],
                ),
            ),
            (
                format!("/download/{wanted}"),
                tarball(&[("tool/bin/tool", b"#!/bin/sh\necho tool\n"), ("README", b"docs")]),
            ),
        ]
    })
    .await;
    config.api_base_url = format!("http://{addr}");

    let pkg = release_package(
        &config,
        "tool",
        "tool_{{ .Release.Tag }}_custom.tar.gz",
        Some("tool/bin/tool"),
    );
    let (statuses, state) = install(&config, &pkg).await;

    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].message, TAG);
    assert!(pkg.home().join("tool/bin/tool").is_file());
    assert!(pkg.home().join("README").is_file());
    assert!(!pkg.home().join(&wanted).exists());

    let link = config.bin_dir().join("tool");
    assert_eq!(std::fs::read_link(&link).unwrap(), pkg.home().join("tool/bin/tool"));
    assert!(afx_aio::fs::is_executable(&pkg.home().join("tool/bin/tool")));

    let record = state.get(&pkg.id()).unwrap().expect("install was not recorded");
    assert_eq!(record.version, TAG);
    assert!(record.paths.contains(&link.to_string_lossy().to_string()));
}

#[tokio::test]
async fn bare_release_binary_is_renamed_to_the_release_name() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = Config::with_root(tmp.path());
    let addr = serve_routes(|addr| {
        vec![
            (
                "/repos/acme/greet/releases/tags/v1.2.0".to_string(),
                release_json(addr, &["greet-raw", "greet-raw.sha256"]),
            ),
            (
                "/download/greet-raw".to_string(),
                b"#!/bin/sh\necho hi\n".to_vec(),
            ),
        ]
    })
    .await;
    config.api_base_url = format!("http://{addr}");

    let pkg = release_package(&config, "greet", "greet-raw", None);
    let (_, state) = install(&config, &pkg).await;

    let binary = pkg.home().join("greet");
    assert_eq!(std::fs::read(&binary).unwrap(), b"#!/bin/sh\necho hi\n");
    assert!(!pkg.home().join("greet-raw").exists());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&binary).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
    assert_eq!(state.get(&pkg.id()).unwrap().unwrap().version, TAG);
}
