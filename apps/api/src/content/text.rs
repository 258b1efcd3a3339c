//! HTML stripping and excerpt truncation shared by every normalizer.

use std::sync::LazyLock;

use regex::Regex;

/// Excerpt length before the ellipsis, in characters.
pub const EXCERPT_CHARS: usize = 200;
const ELLIPSIS: &str = "...";

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid HTML tag regex"));
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});")
        .expect("Invalid HTML entity regex")
});

/// Removes markup, decodes common entities, and trims the result.
pub fn strip_html(html: &str) -> String {
    let without_tags = TAG.replace_all(html, "");
    let decoded = ENTITY.replace_all(&without_tags, |caps: &regex::Captures| {
        decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    decoded.trim().to_string()
}

fn decode_entity(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }

    let decoded = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "hellip" => "…",
        "mdash" => "—",
        "ndash" => "–",
        "rsquo" => "’",
        "lsquo" => "‘",
        "rdquo" => "”",
        "ldquo" => "“",
        _ => return None,
    };
    Some(decoded.to_string())
}

/// Cuts `text` to [`EXCERPT_CHARS`] characters and appends `...` when, and
/// only when, something was cut. Counts chars, so never splits a codepoint.
pub fn truncate_excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((byte_idx, _)) => format!("{}{ELLIPSIS}", &text[..byte_idx]),
        None => text.to_string(),
    }
}
