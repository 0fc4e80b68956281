use crate::models::{Hit, Metadata};
use html_escape::encode_text;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

fn display_field(metadata: &Metadata, key: &str) -> String {
    match metadata.get(key) {
        Some(Value::String(value)) => value.clone(),
        Some(Value::Null) | None => "None".to_string(),
        Some(other) => other.to_string(),
    }
}

pub fn format_metadata(metadata: &Metadata) -> String {
    format!(
        "Source: {} — Page: {}",
        display_field(metadata, "source"),
        display_field(metadata, "page")
    )
}

/// One-line header for a ranked hit, e.g. `Result 1 — Source: a.pdf — Page: 2 — distance: 0.1234`.
pub fn format_hit_header(rank: usize, hit: &Hit) -> String {
    let distance = hit
        .distance
        .map(|distance| format!("{distance:.4}"))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "Result {rank} — {} — distance: {distance}",
        format_metadata(&hit.metadata)
    )
}

fn terms_pattern(terms: &[String]) -> Option<Regex> {
    let mut unique = terms
        .iter()
        .map(|term| term.trim())
        .filter(|term| !term.is_empty())
        .collect::<Vec<_>>();
    if unique.is_empty() {
        return None;
    }
    // longest first so overlapping terms prefer the fuller match
    unique.sort_by(|left, right| right.len().cmp(&left.len()).then(left.cmp(right)));
    unique.dedup();

    let alternation = unique
        .iter()
        .map(|term| regex::escape(term))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&alternation)
        .case_insensitive(true)
        .build()
        .ok()
}

/// Wraps every case-insensitive occurrence of any term in `open`/`close`.
/// Blank terms are ignored.
pub fn highlight_terms(text: &str, terms: &[String], open: &str, close: &str) -> String {
    match terms_pattern(terms) {
        Some(pattern) => pattern
            .replace_all(text, |captures: &regex::Captures<'_>| {
                format!("{open}{}{close}", &captures[0])
            })
            .into_owned(),
        None => text.to_string(),
    }
}

/// HTML rendering of a chunk: escaped, newlines as `<br>`, terms in `<mark>`.
/// Terms are matched against the raw text, so they never land inside an
/// entity.
pub fn highlight_html(text: &str, terms: &[String]) -> String {
    let mut html = String::with_capacity(text.len());
    let mut cursor = 0;

    if let Some(pattern) = terms_pattern(terms) {
        for found in pattern.find_iter(text) {
            html.push_str(&encode_text(&text[cursor..found.start()]));
            html.push_str("<mark>");
            html.push_str(&encode_text(found.as_str()));
            html.push_str("</mark>");
            cursor = found.end();
        }
    }
    html.push_str(&encode_text(&text[cursor..]));

    html.replace('\n', "<br>")
}
