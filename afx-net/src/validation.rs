// afx-net/src/validation.rs
use afx_common::error::{AfxError, Result};
use tracing::warn;
use url::Url;

/// Validates a download URL. Only http(s) is accepted; plain http is allowed with a warning.
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str)
        .map_err(|e| AfxError::Validation(format!("Failed to parse URL '{url_str}': {e}")))?;
    match url.scheme() {
        "https" => Ok(url),
        "http" => {
            warn!("Downloading over plain http: {}", url_str);
            Ok(url)
        }
        other => Err(AfxError::Validation(format!(
            "Invalid URL scheme for '{url_str}': must be http or https, but got '{other}'"
        ))),
    }
}
