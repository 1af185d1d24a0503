// afx-core/tests/common/mod.rs
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use afx_common::model::Http;
use afx_common::{Config, Package, PackageKind};
use afx_core::InstallContext;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// How the loopback server answers the n-th connection.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Body(&'static str),
    NotFound,
    Stall,
}

/// Serves plain HTTP/1.1 on 127.0.0.1 until the test runtime shuts down.
pub async fn serve<F>(reply: F) -> (SocketAddr, Arc<AtomicUsize>)
where
    F: Fn(usize) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let reply = Arc::new(reply);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let reply = Arc::clone(&reply);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = match reply(n) {
                    Reply::Body(body) => format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    ),
                    Reply::NotFound => {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string()
                    }
                    Reply::Stall => {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        return;
                    }
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (addr, hits)
}

/// Serves fixed bodies by request path, 404 for anything else. `routes` is
/// called with the bound address so bodies can link back to the server.
pub async fn serve_routes<F>(routes: F) -> SocketAddr
where
    F: FnOnce(SocketAddr) -> Vec<(String, Vec<u8>)>,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes: Arc<HashMap<String, Vec<u8>>> = Arc::new(routes(addr).into_iter().collect());
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let response = match routes.get(&path) {
                    Some(body) => {
                        let mut head = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        )
                        .into_bytes();
                        head.extend_from_slice(body);
                        head
                    }
                    None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_vec(),
                };
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

pub fn context(config: &Config, cancel: CancellationToken) -> InstallContext {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    InstallContext::new(config.clone(), client, None, None, cancel)
}

pub fn http_package(config: &Config, addr: SocketAddr, name: &str) -> Package {
    http_package_with_output(config, addr, name, None)
}

pub fn http_package_with_output(
    config: &Config,
    addr: SocketAddr,
    name: &str,
    output: Option<&str>,
) -> Package {
    let http = Http {
        name: name.to_string(),
        url: format!("http://{addr}/{name}/payload.txt"),
        output: output.map(str::to_string),
        description: String::new(),
        plugin: None,
        command: None,
        depends_on: Vec::new(),
    };
    Package::new(PackageKind::Http(http), config).unwrap()
}
