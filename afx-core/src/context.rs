// afx-core/src/context.rs
use afx_common::Config;
use afx_net::GitHubClient;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

/// Everything a lifecycle operation needs besides the package itself.
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub config: Config,
    pub http: Client,
    pub github: GitHubClient,
    pub sudo_password: Option<String>,
    pub cancel: CancellationToken,
}

impl InstallContext {
    pub fn new(
        config: Config,
        http: Client,
        github_token: Option<String>,
        sudo_password: Option<String>,
        cancel: CancellationToken,
    ) -> Self {
        let github = GitHubClient::new(http.clone(), config.api_base_url.clone(), github_token);
        Self {
            config,
            http,
            github,
            sudo_password: sudo_password.filter(|p| !p.is_empty()),
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
