use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::db::NewJob;

pub const UNKNOWN_COMPANY: &str = "Unknown Company";
pub const UNKNOWN_LOCATION: &str = "Unknown Location";
pub const NO_DESCRIPTION: &str = "No description available";
const TITLE_PLACEHOLDER: &str = "Unknown Title";
const DESCRIPTION_LIMIT: usize = 500;
const ELLIPSIS: &str = "...";

/// One item of the extracted collection. Every field is optional and
/// wrong-typed values read as absent.
#[derive(Debug, Default, Deserialize)]
pub struct RawRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub position: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<NamedField>,
    #[serde(default)]
    pub location: Option<NamedField>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
}

/// Company and location arrive either as a bare string or as `{"name": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NamedField {
    Text(String),
    Object { name: String },
    Other(IgnoredAny),
}

impl NamedField {
    fn resolve(&self) -> Option<&str> {
        match self {
            NamedField::Text(s) => Some(s),
            NamedField::Object { name } => Some(name),
            NamedField::Other(_) => None,
        }
    }
}

impl RawRecord {
    /// `None` when the item isn't a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}

fn lenient_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.and_then(|v| v.as_str().map(str::to_string)))
}

/// Map a raw record onto the canonical listing. Pure: no I/O, no clock.
pub fn normalize(raw: &RawRecord, site_root: &str) -> NewJob {
    let title = [&raw.title, &raw.position, &raw.name]
        .into_iter()
        .flatten()
        .find(|t| !t.trim().is_empty() && t.as_str() != TITLE_PLACEHOLDER)
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    let company = named_or(raw.company.as_ref(), UNKNOWN_COMPANY);
    let location = named_or(raw.location.as_ref(), UNKNOWN_LOCATION);

    let description = match raw.description.as_deref() {
        Some(html) if !html.trim().is_empty() => clean_description(html),
        _ => NO_DESCRIPTION.to_string(),
    };

    let url = match raw.id.as_ref().and_then(id_segment) {
        Some(id) => format!("{}/jobs/{}", site_root.trim_end_matches('/'), id),
        None => site_root.to_string(),
    };

    NewJob {
        title,
        company,
        location,
        description,
        url,
    }
}

fn named_or(field: Option<&NamedField>, default: &str) -> String {
    field
        .and_then(NamedField::resolve)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Numbers and non-empty strings, except the falsy `0`.
fn id_segment(id: &Value) -> Option<String> {
    match id {
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Strip tags, collapse whitespace, cap at 500 characters.
pub fn clean_description(html: &str) -> String {
    let fragment = scraper::Html::parse_fragment(html);
    let text = fragment
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");

    if text.is_empty() {
        return NO_DESCRIPTION.to_string();
    }
    truncate(&text, DESCRIPTION_LIMIT)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max - ELLIPSIS.len();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ROOT: &str = "https://www.actuarylist.com/";

    fn norm(v: Value) -> NewJob {
        normalize(&RawRecord::from_value(v).unwrap(), ROOT)
    }

    #[test]
    fn missing_company_defaults() {
        let job = norm(json!({ "title": "Actuary" }));
        assert_eq!(job.company, UNKNOWN_COMPANY);
        assert_eq!(job.location, UNKNOWN_LOCATION);
        assert_eq!(job.description, NO_DESCRIPTION);
        assert_eq!(job.url, ROOT);
    }

    #[test]
    fn company_object_and_string_resolve() {
        assert_eq!(norm(json!({ "company": { "name": "Acme" } })).company, "Acme");
        assert_eq!(norm(json!({ "company": "Globex" })).company, "Globex");
        assert_eq!(norm(json!({ "company": { "id": 4 } })).company, UNKNOWN_COMPANY);
        assert_eq!(norm(json!({ "company": 12 })).company, UNKNOWN_COMPANY);
        assert_eq!(norm(json!({ "location": ["Remote", "NYC"] })).location, UNKNOWN_LOCATION);
        assert_eq!(norm(json!({ "location": null })).location, UNKNOWN_LOCATION);
        assert_eq!(norm(json!({ "location": { "name": "Remote" } })).location, "Remote");
        assert_eq!(norm(json!({ "location": "Chicago, IL" })).location, "Chicago, IL");
    }

    #[test]
    fn title_falls_back_through_position_and_name() {
        assert_eq!(norm(json!({ "title": "A", "position": "B" })).title, "A");
        assert_eq!(norm(json!({ "position": "B", "name": "C" })).title, "B");
        assert_eq!(norm(json!({ "title": "", "name": "C" })).title, "C");
        assert_eq!(norm(json!({ "title": "Unknown Title", "position": "B" })).title, "B");
        assert_eq!(norm(json!({ "title": 7 })).title, "");
    }

    #[test]
    fn url_from_id() {
        assert_eq!(norm(json!({ "id": 42 })).url, "https://www.actuarylist.com/jobs/42");
        assert_eq!(norm(json!({ "id": "abc-1" })).url, "https://www.actuarylist.com/jobs/abc-1");
        assert_eq!(norm(json!({ "id": 0 })).url, ROOT);
        assert_eq!(norm(json!({ "id": "" })).url, ROOT);
    }

    #[test]
    fn description_is_stripped_and_collapsed() {
        let job = norm(json!({ "description": "<p>Pricing   role</p>\n<ul><li>FSA</li><li>SQL</li></ul>" }));
        assert_eq!(job.description, "Pricing role FSA SQL");
    }

    #[test]
    fn long_description_is_truncated_to_500() {
        let long = format!("<div>{}</div>", "word ".repeat(200));
        let out = clean_description(&long);
        assert_eq!(out.chars().count(), 500);
        assert!(out.ends_with("..."));
        assert_eq!(&out[..497], &"word ".repeat(200)[..497]);
    }

    #[test]
    fn exactly_500_is_untouched() {
        let text = "x".repeat(500);
        assert_eq!(clean_description(&text), text);
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let text = "é".repeat(600);
        let out = truncate(&text, 500);
        assert_eq!(out.chars().count(), 500);
    }

    #[test]
    fn markup_only_description_gets_placeholder() {
        assert_eq!(clean_description("<p> </p>"), NO_DESCRIPTION);
        assert_eq!(norm(json!({ "description": null })).description, NO_DESCRIPTION);
    }

    #[test]
    fn non_object_record_is_rejected() {
        assert!(RawRecord::from_value(json!("just a string")).is_none());
        assert!(RawRecord::from_value(json!([1, 2])).is_none());
    }

    #[test]
    fn normalize_is_deterministic() {
        let raw = RawRecord::from_value(json!({ "title": "T", "company": { "name": "C" }, "id": 1 })).unwrap();
        assert_eq!(normalize(&raw, ROOT), normalize(&raw, ROOT));
    }
}
