use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
}

/// Console logging plus an append-only run log file.
///
/// The file layer is best-effort: if the log file can't be opened we keep the
/// console layer and say so once logging is up.
pub fn init(log_file: &Path) {
    let file = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| OpenOptions::new().create(true).append(true).open(log_file));

    let console_layer = tracing_subscriber::fmt::layer().with_filter(env_filter());

    let (file_layer, open_error) = match file {
        Ok(f) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Arc::new(f))
                    .with_filter(env_filter()),
            ),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(e) = open_error {
        tracing::warn!("Run log {} unavailable, console only: {}", log_file.display(), e);
    }
}

/// Last `n` lines of the run log, or an empty list when there is none yet.
pub fn tail(log_file: &Path, n: usize) -> Vec<String> {
    let Ok(text) = fs::read_to_string(log_file) else {
        return Vec::new();
    };
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|l| l.to_string()).collect()
}
