pub mod plain;
pub mod rendered;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::artifacts::Artifacts;
use crate::config::Config;
use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Headless browser render, so client-side script has run.
    Rendered,
    /// Direct HTTP GET.
    Plain,
}

impl Strategy {
    /// Attempt order for a run: rendered first, plain as the fallback.
    pub const ORDER: [Strategy; 2] = [Strategy::Rendered, Strategy::Plain];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Rendered => f.write_str("rendered"),
            Strategy::Plain => f.write_str("plain"),
        }
    }
}

/// Markup plus whatever the strategy learned on the way.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub strategy: Strategy,
    pub markup: String,
    /// HTTP status for plain fetches. Non-2xx is not an error here.
    pub status: Option<u16>,
    pub screenshot_saved: bool,
    pub elapsed: Duration,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, strategy: Strategy) -> Result<FetchedPage, FetchError>;
}

/// Fetches the configured site root with either strategy.
pub struct SiteFetcher {
    url: String,
    user_agent: String,
    settle: Duration,
    client: reqwest::Client,
    artifacts: Artifacts,
}

impl SiteFetcher {
    pub fn new(config: &Config, artifacts: Artifacts) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.http_timeout)
            .build()?;
        Ok(SiteFetcher {
            url: config.site_url.clone(),
            user_agent: config.user_agent.clone(),
            settle: config.settle,
            client,
            artifacts,
        })
    }
}

#[async_trait]
impl PageFetcher for SiteFetcher {
    async fn fetch(&self, strategy: Strategy) -> Result<FetchedPage, FetchError> {
        match strategy {
            Strategy::Rendered => {
                let job = rendered::RenderJob {
                    url: self.url.clone(),
                    user_agent: self.user_agent.clone(),
                    settle: self.settle,
                    artifacts: self.artifacts.clone(),
                };
                tokio::task::spawn_blocking(move || rendered::render(job))
                    .await
                    .map_err(|e| FetchError::Worker(e.to_string()))?
            }
            Strategy::Plain => plain::fetch(&self.client, &self.url, &self.artifacts).await,
        }
    }
}
