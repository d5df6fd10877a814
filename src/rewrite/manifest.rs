//! Streaming manifest dialect (HLS playlists, DASH MPDs, sibling text files).
//!
//! Documents starting with `#EXTM3U` are read line by line: every URI line
//! is a reference, and `URI="…"` attributes inside tag lines are references.
//! Anything else gets a token scan that only picks up absolute http(s) URLs
//! and relative paths ending in a known media extension. Manifest references
//! are always wrapped, including ones on the manifest's own host.

use super::{Collector, RewriteContext, RewriteOutcome, SameHost};

/// Rewrite references in a manifest retrieved from `ctx.base()`.
pub fn rewrite_manifest(text: &str, ctx: &RewriteContext) -> RewriteOutcome {
    let mut collector = Collector::default();
    if is_hls(text) {
        scan_hls(text, ctx, &mut collector);
    } else {
        scan_tokens(text, ctx, &mut collector);
    }
    collector.finish(text)
}

fn is_hls(text: &str) -> bool {
    text.trim_start_matches('\u{feff}')
        .trim_start()
        .starts_with("#EXTM3U")
}

fn scan_hls(text: &str, ctx: &RewriteContext, collector: &mut Collector) {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        let content = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
        let leading = content.len() - content.trim_start().len();
        let trimmed = content.trim();
        if trimmed.is_empty() {
            continue;
        }

        let begin = start + leading;
        if trimmed.starts_with('#') {
            uri_attributes(text, begin..begin + trimmed.len(), ctx, collector);
        } else {
            collector.reference(text, begin..begin + trimmed.len(), ctx, ctx.base(), SameHost::Wrap);
        }
    }
}

/// `URI="…"` attributes of one tag line.
fn uri_attributes(
    text: &str,
    line: std::ops::Range<usize>,
    ctx: &RewriteContext,
    collector: &mut Collector,
) {
    const KEY: &str = "URI=\"";
    let bytes = text.as_bytes();
    let mut pos = line.start;

    while let Some(found) = text[pos..line.end].find(KEY) {
        let at = pos + found;
        let value_start = at + KEY.len();
        let boundary = at == line.start || matches!(bytes[at - 1], b':' | b',' | b' ' | b'\t');

        let Some(close) = text[value_start..line.end].find('"') else {
            break;
        };
        let value_end = value_start + close;
        if boundary {
            collector.reference(text, value_start..value_end, ctx, ctx.base(), SameHost::Wrap);
        }
        pos = value_end + 1;
    }
}

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'"' | b'\'' | b'<' | b'>' | b'`')
}

fn scan_tokens(text: &str, ctx: &RewriteContext, collector: &mut Collector) {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut pos = 0;

    while pos < len {
        while pos < len && is_delimiter(bytes[pos]) {
            if let Some(close) = identifier_value_end(text, pos) {
                pos = close;
            }
            pos += 1;
        }
        let start = pos;
        while pos < len && !is_delimiter(bytes[pos]) {
            pos += 1;
        }
        if start == pos {
            continue;
        }

        let token = &text[start..pos];
        if is_absolute_http(token) || is_media_path(token, ctx.media_extensions()) {
            collector.reference(text, start..pos, ctx, ctx.base(), SameHost::Wrap);
        }
    }
}

/// Attributes whose values are XML namespace names or schema locations.
/// They identify vocabularies and are never fetched by a player.
fn is_identifier_attribute(name: &str) -> bool {
    let local = name.rsplit(':').next().unwrap_or(name);
    name == "xmlns"
        || name.starts_with("xmlns:")
        || local == "schemaLocation"
        || local == "noNamespaceSchemaLocation"
}

/// Name of the attribute whose value opens with the quote at `quote`.
fn attribute_before(text: &str, quote: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut end = quote;
    while end > 0 && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    if end == 0 || bytes[end - 1] != b'=' {
        return None;
    }
    end -= 1;
    while end > 0 && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    let mut start = end;
    while start > 0 && (bytes[start - 1].is_ascii_alphanumeric() || matches!(bytes[start - 1], b':' | b'-' | b'_' | b'.')) {
        start -= 1;
    }
    (start < end).then(|| &text[start..end])
}

/// Position of the closing quote when `pos` opens an identifier attribute value.
fn identifier_value_end(text: &str, pos: usize) -> Option<usize> {
    let quote = match text.as_bytes()[pos] {
        q @ (b'"' | b'\'') => q as char,
        _ => return None,
    };
    if !is_identifier_attribute(attribute_before(text, pos)?) {
        return None;
    }
    text[pos + 1..].find(quote).map(|i| pos + 1 + i)
}

fn is_absolute_http(token: &str) -> bool {
    let head = token.get(..8).unwrap_or(token).to_ascii_lowercase();
    head.starts_with("http://") || head.starts_with("https://")
}

/// A bare relative path such as `seg1.ts` or `../keys/k.key?t=1`.
fn is_media_path(token: &str, extensions: &[String]) -> bool {
    if token.starts_with('#') || token.contains("://") {
        return false;
    }
    let path = token.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
    if path.contains(|c: char| matches!(c, '=' | ':' | '(' | ')' | ';' | ',')) {
        return false;
    }
    let lower = path.to_ascii_lowercase();
    extensions
        .iter()
        .any(|ext| lower.len() > ext.len() && lower.ends_with(ext.as_str()))
}
