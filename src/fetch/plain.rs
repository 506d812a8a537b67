use std::time::Instant;

use tracing::info;

use super::{FetchedPage, Strategy};
use crate::artifacts::{self, Artifacts};
use crate::error::FetchError;

/// One GET with the client's browser-like User-Agent. Any HTTP status is
/// returned as markup; only transport failures are errors.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    artifacts: &Artifacts,
) -> Result<FetchedPage, FetchError> {
    let start = Instant::now();
    let response = client.get(url).send().await?;
    let status = response.status().as_u16();
    let markup = response.text().await?;

    info!(
        "Plain fetch of {} returned status {} ({} bytes)",
        url,
        status,
        markup.len()
    );
    artifacts.write(artifacts::PLAIN_MARKUP, markup.as_bytes());

    Ok(FetchedPage {
        strategy: Strategy::Plain,
        markup,
        status: Some(status),
        screenshot_saved: false,
        elapsed: start.elapsed(),
    })
}
