use std::ffi::OsStr;
use std::time::{Duration, Instant};

use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions};
use tracing::{info, warn};

use super::{FetchedPage, Strategy};
use crate::artifacts::{self, Artifacts};
use crate::config::VIEWPORT;
use crate::error::FetchError;

pub struct RenderJob {
    pub url: String,
    pub user_agent: String,
    pub settle: Duration,
    pub artifacts: Artifacts,
}

/// Blocking: run on `spawn_blocking`.
///
/// The browser process is owned here and dropped before returning, whichever
/// way the render went.
pub fn render(job: RenderJob) -> Result<FetchedPage, FetchError> {
    let start = Instant::now();
    let ua_arg = format!("--user-agent={}", job.user_agent);
    let args = vec![
        OsStr::new("--disable-gpu"),
        OsStr::new("--no-sandbox"),
        OsStr::new("--disable-dev-shm-usage"),
        OsStr::new(&ua_arg),
    ];

    let browser = Browser::new(LaunchOptions {
        headless: true,
        sandbox: false,
        window_size: Some(VIEWPORT),
        args,
        ..Default::default()
    })
    .map_err(|e| FetchError::BrowserLaunch(e.to_string()))?;

    let result = capture(&browser, &job);
    drop(browser);
    info!("Browser session released");

    let (markup, screenshot_saved) = result?;
    job.artifacts.write(artifacts::RENDERED_MARKUP, markup.as_bytes());

    Ok(FetchedPage {
        strategy: Strategy::Rendered,
        markup,
        status: None,
        screenshot_saved,
        elapsed: start.elapsed(),
    })
}

fn capture(browser: &Browser, job: &RenderJob) -> Result<(String, bool), FetchError> {
    let nav = |e: anyhow::Error| FetchError::Navigation(e.to_string());

    let tab = browser.new_tab().map_err(nav)?;
    tab.navigate_to(&job.url).map_err(nav)?;
    tab.wait_until_navigated().map_err(nav)?;
    info!("Navigated to {}", job.url);

    // Fixed settle delay, not a readiness condition. Slow client renders can
    // still be missed.
    std::thread::sleep(job.settle);

    let screenshot_saved = match tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true) {
        Ok(png) => {
            job.artifacts.write(artifacts::SCREENSHOT, &png);
            true
        }
        Err(e) => {
            warn!("Screenshot failed: {}", e);
            false
        }
    };

    let markup = tab.get_content().map_err(nav)?;
    Ok((markup, screenshot_saved))
}
