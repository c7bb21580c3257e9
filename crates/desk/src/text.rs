//! Rich text to plain text conversion for message bodies

use ammonia::Builder;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Tags that end a visual line
const BLOCK_TAGS: &[&str] = &[
    "br", "p", "div", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre",
];

/// Tags whose content is never shown
const HIDDEN_TAGS: &[&str] = &["style", "script", "head", "title"];

/// Sanitizer that keeps only line-structure tags. Everything it emits is
/// well formed, so any `<` left in its output opens a tag and text `<` comes
/// back as `&lt;`.
static LINE_STRUCTURE: LazyLock<Builder<'static>> = LazyLock::new(|| {
    let mut b = Builder::empty();
    b.tags(BLOCK_TAGS.iter().copied().collect::<HashSet<_>>());
    b.clean_content_tags(HIDDEN_TAGS.iter().copied().collect::<HashSet<_>>());
    b.strip_comments(true);
    b
});

/// Convert an HTML message body to plain text.
///
/// Block-level tags become line breaks, hidden elements are dropped, entities
/// are decoded and runs of blank lines are collapsed. Plain input passes
/// through with only whitespace normalization.
pub fn html_to_plain_text(html: &str) -> String {
    let cleaned = LINE_STRUCTURE.clean(html).to_string();

    let mut out = String::with_capacity(cleaned.len());
    let mut rest = cleaned.as_str();
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        let tag = &rest[start + 1..start + len];
        rest = &rest[start + len + 1..];

        let closing = tag.starts_with('/');
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or_default();

        if name == "p" && closing {
            out.push_str("\n\n");
        } else if name == "br" || closing {
            out.push('\n');
        } else if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
    }
    out.push_str(rest);

    normalize_whitespace(&decode_html_entities(&out))
}

/// Decode the entities the sanitizer writes back into text
pub fn decode_html_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn normalize_whitespace(s: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0;
    for line in s.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank_run += 1;
            // Keep at most one blank line between paragraphs
            if blank_run > 1 || lines.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}
