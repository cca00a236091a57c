use crate::types::{Article, RawEntry};
use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

/// Query parameters stripped during URL canonicalization.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "ref", "source", "mc_cid", "mc_eid", "ocid",
];

const MAX_CONTENT_CHARS: usize = 500;

/// Normalize one raw feed entry. Returns `None` (entry dropped, logged)
/// when neither a usable title nor a usable link can be extracted; this
/// stage never fails the run.
pub fn normalize(entry: &RawEntry, fetched_at: DateTime<Utc>) -> Option<Article> {
    let title = strip_html(&entry.title);
    if title.is_empty() {
        debug!(feed = %entry.feed_url, "dropping entry without title");
        return None;
    }

    let Some(url) = canonical_url(&entry.link) else {
        debug!(feed = %entry.feed_url, title = %title, "dropping entry without usable link");
        return None;
    };

    let published_at = entry.published.unwrap_or(fetched_at);

    let raw_content = entry
        .summary
        .as_deref()
        .map(strip_html)
        .map(|text| truncate_at_word(&text, MAX_CONTENT_CHARS))
        .unwrap_or_default();

    let id = derive_id(entry.guid.as_deref(), &url);

    Some(Article {
        id,
        title,
        source: entry.source_name.clone(),
        url,
        published_at,
        raw_content,
        language: entry.language,
        tab: entry.tab,
        feed_category: entry.feed_category.clone(),
        category: None,
        card_type: None,
        summary: None,
        summary_source: None,
    })
}

/// Normalize a batch, dropping rejects.
pub fn normalize_all(entries: &[RawEntry], fetched_at: DateTime<Utc>) -> Vec<Article> {
    let articles: Vec<Article> = entries
        .iter()
        .filter_map(|entry| normalize(entry, fetched_at))
        .collect();
    tracing::info!(
        normalized = articles.len(),
        dropped = entries.len() - articles.len(),
        "normalized feed entries"
    );
    articles
}

/// Stable article identity: feed GUID when present, else the canonical URL.
pub fn derive_id(guid: Option<&str>, canonical_url: &str) -> String {
    match guid.map(str::trim) {
        Some(guid) if !guid.is_empty() => guid.to_string(),
        _ => canonical_url.to_string(),
    }
}

/// Canonical form used for identity and dedup: lowercased scheme/host,
/// tracking params stripped, fragment dropped, trailing slash removed.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        drop(pairs);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Some(url.to_string())
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Remove markup, decode entities, collapse whitespace.
pub fn strip_html(input: &str) -> String {
    let mut text = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    collapse_whitespace(&decode_entities(&text))
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the named entities feeds actually use, plus numeric forms.
fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    while let Some((start, ch)) = chars.next() {
        if ch != '&' {
            out.push(ch);
            continue;
        }
        let rest = &input[start + 1..];
        let Some(end) = rest.find(';').filter(|&end| end <= 10) else {
            out.push('&');
            continue;
        };
        let entity = &rest[..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                for _ in 0..=end {
                    chars.next();
                }
            }
            None => out.push('&'),
        }
    }
    out
}

/// Cut to at most `max` characters, backing up to the last space when one
/// exists past the halfway point.
fn truncate_at_word(text: &str, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return text.to_string();
    }
    let head: String = chars[..max].iter().collect();
    if let Some(cut) = head.rfind(' ').filter(|&cut| cut >= head.len() / 2) {
        format!("{}...", &head[..cut])
    } else {
        format!("{}...", head)
    }
}
