// afx-net/src/github.rs
//! Minimal GitHub REST client for release lookups.
use afx_common::error::{AfxError, Result};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::http::bearer;

const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub name: Option<String>,
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Where a release tag is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseQuery {
    Latest,
    Tag(String),
}

impl ReleaseQuery {
    /// Unset, `latest` and `stable` resolve to the latest published release.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "" | "latest" | "stable" => ReleaseQuery::Latest,
            other => ReleaseQuery::Tag(other.to_string()),
        }
    }

    fn path(&self, owner: &str, repo: &str) -> String {
        match self {
            ReleaseQuery::Latest => format!("/repos/{owner}/{repo}/releases/latest"),
            ReleaseQuery::Tag(tag) => format!("/repos/{owner}/{repo}/releases/tags/{tag}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(client: Client, api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn release_url(&self, owner: &str, repo: &str, query: &ReleaseQuery) -> String {
        format!("{}{}", self.api_base, query.path(owner, repo))
    }

    pub async fn fetch_release(
        &self,
        owner: &str,
        repo: &str,
        query: &ReleaseQuery,
        cancel: &CancellationToken,
    ) -> Result<Release> {
        let url = self.release_url(owner, repo, query);
        debug!("Fetching release metadata from {}", url);

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, bearer(token)?);
        }

        let response = tokio::select! {
            res = request.send() => res.map_err(|e| {
                AfxError::Fetch(format!("failed to query {url}: {e}"))
            })?,
            _ = cancel.cancelled() => return Err(AfxError::Cancelled),
        };
        let status = response.status();
        let body = tokio::select! {
            res = response.text() => res?,
            _ = cancel.cancelled() => return Err(AfxError::Cancelled),
        };

        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            error!("GitHub API error {} for {}: {}", status, url, message);
            return Err(AfxError::Api(format!("{url}: {message} ({status})")));
        }
        parse_release(&body)
    }

    pub async fn latest_release(
        &self,
        owner: &str,
        repo: &str,
        cancel: &CancellationToken,
    ) -> Result<Release> {
        self.fetch_release(owner, repo, &ReleaseQuery::Latest, cancel)
            .await
    }
}

pub fn parse_release(body: &str) -> Result<Release> {
    let release: Release = serde_json::from_str(body)?;
    debug!(
        "Release {} has {} assets",
        release.tag_name,
        release.assets.len()
    );
    Ok(release)
}
