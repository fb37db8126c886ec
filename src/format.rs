//! Outbound message formatting for Telegram's HTML parse mode.
//!
//! Feed titles and LLM summaries are untrusted markup.  [`sanitize_markup`]
//! keeps the inline tags Telegram understands and neutralises everything
//! else, so a stray `<` in a headline can neither break the Bot API's parser
//! nor inject markup.  The pass is idempotent.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::source::FeedItem;

/// Any angle-bracketed construct.
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<>]*>").unwrap());

/// Bare opening or closing tag from the allow-list: bold, italic, link,
/// monospace, monospace block, underline, strikethrough, spoiler.
static ALLOWED_BARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^</?(?:b|i|a|code|pre|u|s|tg-spoiler)>$").unwrap());

/// `<a href="...">` with a single quoted href on a safe scheme.
static ALLOWED_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)^<a\s+href\s*=\s*(?:"(?:https?://|tg://|mailto:)[^"'<>]*"|'(?:https?://|tg://|mailto:)[^"'<>]*')\s*>$"#,
    )
    .unwrap()
});

/// An entity Telegram accepts, or a bare ampersand.
static AMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(?:amp|lt|gt|quot|#[0-9]+|#[xX][0-9a-fA-F]+);|&").unwrap());

fn is_allowed_tag(tag: &str) -> bool {
    ALLOWED_BARE_RE.is_match(tag) || ALLOWED_LINK_RE.is_match(tag)
}

/// Escape bare `&` while leaving supported entities untouched.
fn escape_ampersands(text: &str) -> String {
    AMP_RE
        .replace_all(text, |caps: &Captures| match &caps[0] {
            "&" => "&amp;".to_string(),
            entity => entity.to_string(),
        })
        .into_owned()
}

/// Escape a text run that contains no allowed tags.
fn escape_text(text: &str) -> String {
    escape_ampersands(text)
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape a value for use inside a double-quoted attribute.
fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Keep allow-listed inline tags, strip every other `<...>` construct, and
/// escape whatever `<`, `>` or bare `&` remains.
///
/// Text between constructs is escaped run by run, so stripping a tag can
/// never splice two fragments into a new one: `<<x>b>` becomes `&lt;b&gt;`.
pub fn sanitize_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for m in TAG_RE.find_iter(text) {
        out.push_str(&escape_text(&text[last..m.start()]));
        if is_allowed_tag(m.as_str()) {
            out.push_str(m.as_str());
        }
        last = m.end();
    }
    out.push_str(&escape_text(&text[last..]));

    out
}

/// Build the message for one item.
///
/// ```text
/// <b>{title}</b>
/// <a href="{link}">Read more</a>
///
/// {summary}
/// ```
///
/// A missing (or blank) summary leaves the last section empty.
pub fn format_message(item: &FeedItem, summary: Option<&str>) -> String {
    let summary = summary
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(sanitize_markup)
        .unwrap_or_default();

    format!(
        "<b>{}</b>\n<a href=\"{}\">Read more</a>\n\n{}",
        sanitize_markup(&item.title),
        escape_attr(&item.link),
        summary
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
