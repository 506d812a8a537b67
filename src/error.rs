use thiserror::Error;

/// Failure to obtain markup at all. Triggers the fallback strategy.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("http transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("browser task aborted: {0}")]
    Worker(String),
}

/// A script block that looked like JSON but didn't parse.
#[derive(Debug, Error)]
#[error("malformed JSON payload in {origin}: {source}")]
pub struct MalformedPayload {
    pub origin: String,
    #[source]
    pub source: serde_json::Error,
}

/// Why a run ended in `Failed`. Never escapes the orchestrator.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("no structured job payload found by any fetch strategy")]
    NotFound,
    #[error("storage error: {0}")]
    Persistence(#[from] rusqlite::Error),
    #[error("storage unavailable: connection lock poisoned")]
    StoreUnavailable,
    #[error("another process holds the run lock")]
    Busy,
}
