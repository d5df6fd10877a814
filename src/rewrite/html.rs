//! HTML dialect rewriter.
//!
//! Runs the document through `lol_html`. Element handlers rewrite
//! URL-bearing attributes and `srcset` candidates, the first `<base href>`
//! moves the resolution base, and inside `<script>` string literals that
//! consist of a single absolute URL are rewritten. Markup no handler matches
//! streams through untouched.

use std::cell::RefCell;
use std::ops::Range;

use lol_html::html_content::ContentType;
use lol_html::{element, text, HtmlRewriter, Settings};
use url::Url;

use super::{decode_amp, Collector, RewriteContext, RewriteOutcome, SameHost};

/// Attributes whose whole value is one URL.
const URL_ATTRIBUTES: [&str; 6] = ["src", "href", "action", "poster", "data-src", "formaction"];

const URL_SELECTOR: &str = "[src], [href], [action], [poster], [data-src], [formaction]";

/// State shared by the element and text handlers of one document.
struct Document<'c> {
    ctx: &'c RewriteContext,
    /// Resolution base; replaced by the first `<base href>`.
    base: Url,
    base_seen: bool,
    same_host: SameHost,
    collector: Collector,
    /// Script text buffered until the end of its text node.
    script: String,
}

impl Document<'_> {
    fn set_base(&mut self, href: &str) {
        if self.base_seen {
            return;
        }
        self.base_seen = true;
        match self.base.join(decode_amp(href).trim()) {
            Ok(base) => self.base = base,
            Err(e) => tracing::debug!(href = %href, error = %e, "Ignoring unusable <base href>"),
        }
    }

    /// Rewrite the references at `ranges` of `value`. Returns the new value
    /// when anything changed.
    fn rewrite_value(&mut self, value: &str, ranges: Vec<Range<usize>>) -> Option<String> {
        for range in ranges {
            self.collector
                .reference(value, range, self.ctx, &self.base, self.same_host);
        }
        self.collector.splice(value)
    }
}

/// Rewrite references in an HTML document.
pub fn rewrite_html(text: &str, ctx: &RewriteContext) -> RewriteOutcome {
    let doc = RefCell::new(Document {
        ctx,
        base: ctx.base().clone(),
        base_seen: false,
        same_host: ctx.same_host_policy(),
        collector: Collector::default(),
        script: String::new(),
    });
    let mut output = Vec::with_capacity(text.len());

    let result = {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("base[href]", |el| {
                        if let Some(href) = el.get_attribute("href") {
                            doc.borrow_mut().set_base(&href);
                        }
                        Ok(())
                    }),
                    element!(URL_SELECTOR, |el| {
                        if el.tag_name().eq_ignore_ascii_case("base") {
                            return Ok(());
                        }
                        for name in URL_ATTRIBUTES {
                            let Some(value) = el.get_attribute(name) else {
                                continue;
                            };
                            let whole = vec![0..value.len()];
                            if let Some(new) = doc.borrow_mut().rewrite_value(&value, whole) {
                                el.set_attribute(name, &new)?;
                            }
                        }
                        Ok(())
                    }),
                    element!("[srcset]", |el| {
                        if let Some(value) = el.get_attribute("srcset") {
                            let candidates = srcset_urls(&value);
                            if let Some(new) = doc.borrow_mut().rewrite_value(&value, candidates) {
                                el.set_attribute("srcset", &new)?;
                            }
                        }
                        Ok(())
                    }),
                    text!("script", |chunk| {
                        let mut doc = doc.borrow_mut();
                        doc.script.push_str(chunk.as_str());
                        if !chunk.last_in_text_node() {
                            chunk.remove();
                            return Ok(());
                        }
                        let script = std::mem::take(&mut doc.script);
                        let literals = script_urls(&script);
                        let script = doc.rewrite_value(&script, literals).unwrap_or(script);
                        // Raw text: inserted without escaping.
                        chunk.replace(&script, ContentType::Html);
                        Ok(())
                    }),
                ],
                strict: false,
                ..Settings::default()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );
        rewriter.write(text.as_bytes()).and_then(|_| rewriter.end())
    };

    let mut collector = doc.into_inner().collector;
    let reason = match result {
        Ok(()) => match String::from_utf8(output) {
            Ok(rewritten) => return collector.finish_with(rewritten),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    tracing::warn!(error = %reason, "HTML rewriting failed, document left unchanged");
    collector.fail("<document>", reason);
    let mut outcome = collector.finish_with(text.to_string());
    outcome.rewritten = 0;
    outcome
}

/// Byte ranges of the URLs in a `srcset` value: each candidate is a URL
/// (no whitespace) then optional descriptors up to the next top-level comma.
fn srcset_urls(value: &str) -> Vec<Range<usize>> {
    let bytes = value.as_bytes();
    let end = bytes.len();
    let mut urls = Vec::new();
    let mut pos = 0;

    while pos < end {
        pos = scan(bytes, pos, end, |b| is_space(b) || b == b',');
        if pos >= end {
            break;
        }

        let url_start = pos;
        pos = scan(bytes, pos, end, |b| !is_space(b));
        let mut url_end = pos;
        while url_end > url_start && bytes[url_end - 1] == b',' {
            url_end -= 1;
        }
        if url_end > url_start {
            urls.push(url_start..url_end);
        }
        if url_end < pos {
            continue;
        }

        let mut depth = 0usize;
        while pos < end {
            match bytes[pos] {
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b',' if depth == 0 => break,
                _ => {}
            }
            pos += 1;
        }
    }
    urls
}

/// Byte ranges of the string literals in script text that are exactly one
/// absolute http(s) URL. Comments are skipped.
fn script_urls(script: &str) -> Vec<Range<usize>> {
    let bytes = script.as_bytes();
    let end = bytes.len();
    let mut urls = Vec::new();
    let mut pos = 0;

    while pos < end {
        match bytes[pos] {
            b'/' if pos + 1 < end && bytes[pos + 1] == b'/' => {
                pos = find_byte(bytes, b'\n', pos).unwrap_or(end);
            }
            b'/' if pos + 1 < end && bytes[pos + 1] == b'*' => {
                pos = find_seq(bytes, b"*/", pos + 2).map_or(end, |p| p + 2);
            }
            quote @ (b'"' | b'\'' | b'`') => {
                pos = match string_literal(bytes, pos + 1, quote) {
                    Some(close) => {
                        if is_url_literal(&script[pos + 1..close], quote) {
                            urls.push(pos + 1..close);
                        }
                        close + 1
                    }
                    None => pos + 1,
                };
            }
            _ => pos += 1,
        }
    }
    urls
}

/// Find the closing quote of a literal starting at `pos`. Plain quotes
/// may not span lines.
fn string_literal(bytes: &[u8], mut pos: usize, quote: u8) -> Option<usize> {
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'\n' if quote != b'`' => return None,
            b if b == quote => return Some(pos),
            _ => pos += 1,
        }
    }
    None
}

fn is_url_literal(literal: &str, quote: u8) -> bool {
    let lower = literal.get(..8).unwrap_or(literal).to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return false;
    }
    !(literal.bytes().any(|b| is_space(b) || b == b'\\')
        || (quote == b'`' && literal.contains("${")))
}

fn scan(bytes: &[u8], mut pos: usize, end: usize, pred: impl Fn(u8) -> bool) -> usize {
    while pos < end && pred(bytes[pos]) {
        pos += 1;
    }
    pos
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c')
}

fn find_byte(haystack: &[u8], needle: u8, from: usize) -> Option<usize> {
    haystack.get(from..)?.iter().position(|&b| b == needle).map(|i| i + from)
}

fn find_seq(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}
