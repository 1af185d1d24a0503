// afx-net/src/http.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use afx_common::error::{AfxError, Result};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use tokio::fs::{self, File as TokioFile};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::validation::validate_url;

const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "afx package manager (Rust)";

pub fn build_http_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| AfxError::Fetch(format!("Failed to build HTTP client: {e}")))
}

pub(crate) fn bearer(token: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| AfxError::Validation(format!("invalid token: {e}")))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Streams `url` into `final_path`.
///
/// Bytes go to a hidden `.<name>.download` sibling that is renamed into place
/// only after the body has been fully written, so a failed or cancelled
/// transfer never leaves a file at `final_path`.
pub async fn download_file(
    client: &Client,
    url: &str,
    final_path: &Path,
    token: Option<&str>,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    validate_url(url)?;
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let label = file_label(final_path);
    let temp_path = final_path.with_file_name(format!(".{label}.download"));
    debug!("Downloading {} to temporary path {}", url, temp_path.display());

    let result = tokio::select! {
        res = stream_to(client, url, &temp_path, &label, token) => res,
        _ = cancel.cancelled() => Err(AfxError::Cancelled),
    };
    if let Err(e) = result {
        if let Err(remove_err) = fs::remove_file(&temp_path).await {
            if remove_err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Could not remove temporary file {}: {}",
                    temp_path.display(),
                    remove_err
                );
            }
        }
        return Err(match e {
            AfxError::Cancelled => AfxError::Cancelled,
            AfxError::Download(..) => e,
            other => AfxError::Download(label, url.to_string(), other.to_string()),
        });
    }

    fs::rename(&temp_path, final_path).await?;
    debug!("Moved download to final location: {}", final_path.display());
    Ok(final_path.to_path_buf())
}

async fn stream_to(
    client: &Client,
    url: &str,
    temp_path: &Path,
    label: &str,
    token: Option<&str>,
) -> Result<()> {
    let mut request = client.get(url);
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        request = request.header(AUTHORIZATION, bearer(token)?);
    }
    let response = request.send().await.map_err(|e| {
        debug!("HTTP request failed for {url}: {e}");
        AfxError::Fetch(format!("HTTP request failed for {url}: {e}"))
    })?;

    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);
    if !status.is_success() {
        error!("HTTP error {} for URL {}", status, url);
        let reason = match status {
            StatusCode::NOT_FOUND => "Resource not found (404)".to_string(),
            StatusCode::FORBIDDEN => "Access forbidden (403)".to_string(),
            other => format!("HTTP error {other}"),
        };
        return Err(AfxError::Download(label.to_string(), url.to_string(), reason));
    }

    let mut file = TokioFile::create(temp_path).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| AfxError::Fetch(format!("Failed to read body of {url}: {e}")))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    debug!("Wrote {} bytes from {}", written, url);
    Ok(())
}
