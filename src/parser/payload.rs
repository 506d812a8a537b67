use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::artifacts::{self, Artifacts};
use crate::error::MalformedPayload;

static JSON_SCRIPT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/json"]"#).unwrap());
static NEXT_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script id="__NEXT_DATA__" type="application/json">(.*?)</script>"#).unwrap()
});

const JOBS_POINTER: &str = "/props/pageProps/filteredJobs";
const JOB_COUNT_POINTER: &str = "/props/pageProps/jobCount";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadOrigin {
    /// Nth JSON script block in document order.
    ScriptBlock(usize),
    /// Regex fallback on the `__NEXT_DATA__` marker.
    NextDataMarker,
}

#[derive(Debug, PartialEq)]
pub enum Payload {
    Found {
        origin: PayloadOrigin,
        records: Vec<Value>,
        /// Blocks passed over before `origin`: empty, malformed, or
        /// without the job collection.
        skipped: Vec<PayloadOrigin>,
    },
    /// No data on this page. Not an error.
    NotFound,
}

/// Locate the embedded job collection in fetched markup.
///
/// Script blocks typed `application/json` are tried in document order; the
/// first whose parsed JSON has an array at `props.pageProps.filteredJobs` wins.
/// Blocks that fail to parse are logged and skipped. If no block matches, the
/// raw markup is searched for the `__NEXT_DATA__` marker block.
pub fn extract(markup: &str, artifacts: &Artifacts) -> Payload {
    let blocks = script_blocks(markup);
    info!("Found {} JSON script blocks", blocks.len());
    let mut skipped = Vec::new();

    for (i, text) in blocks.iter().enumerate() {
        let origin = PayloadOrigin::ScriptBlock(i);
        let json = match parse_block(text, origin) {
            Ok(Some(v)) => v,
            Ok(None) => {
                skipped.push(origin);
                continue;
            }
            Err(e) => {
                warn!("Skipping block: {}", e);
                skipped.push(origin);
                continue;
            }
        };
        artifacts.write_json(&artifacts::payload_name(i), &json);

        match job_collection(&json) {
            Some(records) => {
                info!("Found {} jobs in script block {}", records.len(), i);
                return Payload::Found { origin, records, skipped };
            }
            None => {
                info!("Script block {} has no {}, skipping", i, JOBS_POINTER);
                skipped.push(origin);
            }
        }
    }

    info!("No script block carried jobs, trying __NEXT_DATA__ marker");
    let Some(caps) = NEXT_DATA_RE.captures(markup) else {
        return Payload::NotFound;
    };
    let origin = PayloadOrigin::NextDataMarker;
    match parse_block(&caps[1], origin) {
        Ok(Some(json)) => {
            artifacts.write_json(artifacts::NEXT_DATA_PAYLOAD, &json);
            if let Some(records) = job_collection(&json) {
                info!("Found {} jobs in __NEXT_DATA__", records.len());
                return Payload::Found { origin, records, skipped };
            }
        }
        Ok(None) => {}
        Err(e) => warn!("Skipping marker block: {}", e),
    }

    Payload::NotFound
}

fn script_blocks(markup: &str) -> Vec<String> {
    let document = Html::parse_document(markup);
    document
        .select(&JSON_SCRIPT)
        .map(|el| el.text().collect::<String>())
        .collect()
}

/// `Ok(None)` for an empty block.
fn parse_block(text: &str, origin: PayloadOrigin) -> Result<Option<Value>, MalformedPayload> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|source| MalformedPayload {
            origin: describe(origin),
            source,
        })
}

fn job_collection(json: &Value) -> Option<Vec<Value>> {
    let records = json.pointer(JOBS_POINTER)?.as_array()?;
    if let Some(count) = json.pointer(JOB_COUNT_POINTER) {
        info!("Page reports job count {}", count);
    }
    if let Some(first) = records.first() {
        let shape = first.to_string();
        debug!("First job shape: {}", shape.chars().take(1000).collect::<String>());
    }
    Some(records.clone())
}

fn describe(origin: PayloadOrigin) -> String {
    match origin {
        PayloadOrigin::ScriptBlock(i) => format!("script block {}", i),
        PayloadOrigin::NextDataMarker => "__NEXT_DATA__ block".to_string(),
    }
}
