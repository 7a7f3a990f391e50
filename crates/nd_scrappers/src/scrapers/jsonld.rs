use chrono::{DateTime, NaiveDate, Utc};
use scraper::{Html, Selector};
use serde_json::Value;

/// Every JSON-LD object in the page, flattening top-level arrays and `@graph`.
fn objects(document: &Html) -> Vec<Value> {
    let Ok(script_selector) = Selector::parse("script[type='application/ld+json']") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for script in document.select(&script_selector) {
        let Ok(json) = serde_json::from_str::<Value>(script.text().collect::<String>().trim()) else {
            continue;
        };
        let items = match json {
            Value::Array(items) => items,
            other => vec![other],
        };
        for item in items {
            if let Some(Value::Array(graph)) = item.get("@graph") {
                out.extend(graph.iter().cloned());
            }
            out.push(item);
        }
    }
    out
}

/// Extracts authors from JSON-LD metadata in the HTML document.
pub fn extract_authors(document: &Html) -> Vec<String> {
    let mut authors = Vec::new();
    for json in objects(document) {
        match json.get("author") {
            Some(Value::Array(arr)) => {
                for author in arr {
                    match author {
                        Value::String(s) => authors.push(s.trim().to_string()),
                        other => {
                            if let Some(name) = other.get("name").and_then(|n| n.as_str()) {
                                authors.push(name.trim().to_string());
                            }
                        }
                    }
                }
            }
            Some(Value::Object(obj)) => {
                if let Some(name) = obj.get("name").and_then(|n| n.as_str()) {
                    authors.push(name.trim().to_string());
                }
            }
            Some(Value::String(s)) => authors.push(s.trim().to_string()),
            _ => {}
        }
    }
    authors.retain(|a| !a.is_empty());
    authors.dedup();
    authors
}

/// `datePublished` of the first JSON-LD object that has one.
pub fn extract_published(document: &Html) -> Option<DateTime<Utc>> {
    objects(document)
        .iter()
        .filter_map(|json| json.get("datePublished").and_then(|d| d.as_str()))
        .find_map(parse_date)
}

pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
