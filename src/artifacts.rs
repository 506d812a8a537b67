use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

pub const RENDERED_MARKUP: &str = "rendered_page.html";
pub const PLAIN_MARKUP: &str = "plain_page.html";
pub const SCREENSHOT: &str = "rendered_page.png";
pub const NEXT_DATA_PAYLOAD: &str = "next_data.json";

/// Best-effort diagnostic file sink. Every write swallows its own error.
#[derive(Debug, Clone)]
pub struct Artifacts {
    dir: Option<PathBuf>,
}

impl Artifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Artifacts {
            dir: Some(dir.into()),
        }
    }

    /// Sink that writes nothing. Used by tests.
    pub fn disabled() -> Self {
        Artifacts { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn write(&self, name: &str, bytes: &[u8]) {
        let Some(dir) = &self.dir else { return };
        let path = dir.join(name);
        let result = fs::create_dir_all(dir).and_then(|_| fs::write(&path, bytes));
        match result {
            Ok(()) => debug!("Saved {} ({} bytes)", path.display(), bytes.len()),
            Err(e) => warn!("Could not save artifact {}: {}", path.display(), e),
        }
    }

    pub fn write_json(&self, name: &str, value: &serde_json::Value) {
        if self.dir.is_none() {
            return;
        }
        match serde_json::to_vec_pretty(value) {
            Ok(bytes) => self.write(name, &bytes),
            Err(e) => warn!("Could not serialize artifact {}: {}", name, e),
        }
    }

    /// File names of screenshots, markup snapshots and payload dumps.
    pub fn list(&self) -> Vec<String> {
        let Some(dir) = &self.dir else {
            return Vec::new();
        };
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.ends_with(".png") || n.ends_with(".html") || n.ends_with(".json"))
            .collect();
        names.sort();
        names
    }
}

pub fn payload_name(block: usize) -> String {
    format!("payload_{}.json", block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("scraper-artifacts-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn writes_and_lists_known_kinds() {
        let dir = temp_dir();
        let artifacts = Artifacts::new(&dir);
        artifacts.write(PLAIN_MARKUP, b"<html></html>");
        artifacts.write_json(&payload_name(0), &serde_json::json!({ "a": 1 }));
        artifacts.write("notes.txt", b"ignored by list");

        assert_eq!(artifacts.list(), vec!["payload_0.json", "plain_page.html"]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unwritable_dir_does_not_panic() {
        let artifacts = Artifacts::new("/proc/definitely/not/writable");
        artifacts.write(SCREENSHOT, b"png");
        assert!(artifacts.list().is_empty());
    }

    #[test]
    fn disabled_sink_writes_nothing() {
        let artifacts = Artifacts::disabled();
        artifacts.write(RENDERED_MARKUP, b"x");
        assert!(artifacts.dir().is_none());
        assert!(artifacts.list().is_empty());
    }
}
