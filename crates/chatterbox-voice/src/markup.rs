//! Link rendering for assistant replies.
//!
//! Three forms become anchors: `"Label" (https://...)`, `[Label](https://...)` and
//! bare `http(s)://` URLs. Existing `<a>` elements and URLs inside attribute values
//! are left as they are. All other text passes through unchanged.

use regex::{Captures, Regex};
use std::sync::OnceLock;

fn link_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(concat!(
                r#"(?P<anchor>(?is:<a\b[^>]*>.*?</a>))"#,
                r#"|"(?P<qlabel>[^"]+)"\s*\(\s*(?P<qurl>https?://[^\s)]+)\s*\)"#,
                r#"|\[(?P<mlabel>[^\]]+)\]\(\s*(?P<murl>https?://[^\s)]+)\s*\)"#,
                r#"|(?P<bare>https?://[^\s<>"')]+)"#,
            ))
            .ok()
        })
        .as_ref()
}

/// Build a new-tab anchor.
pub fn anchor(url: &str, label: &str) -> String {
    format!(
        r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
        url.replace('"', "&quot;"),
        label.replace('<', "&lt;").replace('>', "&gt;")
    )
}

/// Convert link notations in `text` to anchors.
pub fn render_links(text: &str) -> String {
    let Some(pattern) = link_pattern() else {
        return text.to_string();
    };
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in pattern.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        out.push_str(&replacement(&caps, text, whole.start()));
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

fn replacement(caps: &Captures<'_>, text: &str, start: usize) -> String {
    if let (Some(label), Some(url)) = (caps.name("qlabel"), caps.name("qurl")) {
        return anchor(url.as_str(), label.as_str());
    }
    if let (Some(label), Some(url)) = (caps.name("mlabel"), caps.name("murl")) {
        return anchor(url.as_str(), label.as_str());
    }
    if let Some(url) = caps.name("bare") {
        // Inside an attribute value such as href="..."
        let preceded_by_quote = text[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c == '"' || c == '\'' || c == '=');
        if !preceded_by_quote {
            let url = trim_trailing_punctuation(url.as_str());
            let rest = &caps[0][url.len()..];
            return format!("{}{}", anchor(url, url), rest);
        }
    }
    caps[0].to_string()
}

/// Sentence punctuation directly after a URL is not part of it.
fn trim_trailing_punctuation(url: &str) -> &str {
    url.trim_end_matches(['.', ',', ';', ':', '!', '?'])
}
