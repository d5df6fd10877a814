//! URL rewriting engine.
//!
//! # Data Flow
//! ```text
//! (text, RewriteContext, Dialect)
//!     → html.rs (lol_html handlers) / manifest.rs (line and token scans)
//!       emit non-overlapping edits
//!     → RewriteContext::rewrite_reference (classify, resolve, wrap)
//!     → apply_edits (single splice pass)
//!     → RewriteOutcome { text, rewritten, failures }
//! ```
//!
//! # Design Decisions
//! - Scanners emit edits instead of chaining find/replace passes, so a
//!   reference is rewritten at most once and matches can never overlap
//! - Every emitted URL is `<proxy origin>/?url=<encoded absolute URL>`;
//!   `data:` and other non-http(s) references, and anything already pointing
//!   at the proxy origin, are left as they are
//! - Relative references are resolved with `url::Url::join` against the
//!   document's own URL, never by string concatenation
//! - A token that fails to resolve stays in place and is reported back
//! - Pure: output depends only on (text, context)

pub mod html;
pub mod manifest;

use std::ops::Range;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use url::Url;

/// Characters left unescaped by JavaScript's `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Extensions that identify bare relative paths in manifests by default.
pub const DEFAULT_MEDIA_EXTENSIONS: [&str; 6] = [".ts", ".m3u8", ".mpd", ".key", ".vtt", ".webvtt"];

/// Percent-encode a string the way `encodeURIComponent` does.
pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

/// Which scanner to run over a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Html,
    Manifest,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Html => "html",
            Dialect::Manifest => "manifest",
        }
    }
}

/// A single reference that could not be rewritten. Non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot rewrite {reference:?}: {reason}")]
pub struct RewriteFailure {
    pub reference: String,
    pub reason: String,
}

/// Result of rewriting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub text: String,
    /// Number of references replaced with proxy URLs.
    pub rewritten: usize,
    pub failures: Vec<RewriteFailure>,
}

/// Whether absolute references to the document's own host are wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SameHost {
    Wrap,
    Skip,
}

/// Everything the engine needs to know about one document.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    base: Url,
    proxy_origin: String,
    guard: Option<Url>,
    wrap_same_host: bool,
    media_extensions: Vec<String>,
}

impl RewriteContext {
    /// `base` is the URL the document was retrieved from; `proxy_origin` is
    /// `scheme://host[:port]` of this proxy as the client sees it.
    pub fn new(base: Url, proxy_origin: &str) -> Self {
        let proxy_origin = proxy_origin.trim_end_matches('/').to_string();
        let guard = Url::parse(&proxy_origin).ok();
        Self {
            base,
            proxy_origin,
            guard,
            wrap_same_host: false,
            media_extensions: DEFAULT_MEDIA_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Wrap absolute HTML references even when they point at the page host.
    pub fn with_same_host_wrapping(mut self, wrap: bool) -> Self {
        self.wrap_same_host = wrap;
        self
    }

    /// Replace the manifest extension list. Entries are matched case-insensitively.
    pub fn with_media_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.media_extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn proxy_origin(&self) -> &str {
        &self.proxy_origin
    }

    pub fn media_extensions(&self) -> &[String] {
        &self.media_extensions
    }

    /// `<proxy origin>/?url=<encoded url>`.
    pub fn wrap(&self, url: &Url) -> String {
        format!("{}/?url={}", self.proxy_origin, encode_component(url.as_str()))
    }

    /// True when `url` already points at this proxy.
    pub fn is_proxied(&self, url: &Url) -> bool {
        match &self.guard {
            Some(guard) => url.origin() == guard.origin(),
            None => url.as_str().starts_with(&format!("{}/", self.proxy_origin)),
        }
    }

    fn same_host_policy(&self) -> SameHost {
        if self.wrap_same_host {
            SameHost::Wrap
        } else {
            SameHost::Skip
        }
    }

    /// Decide what to do with one reference found in a document.
    ///
    /// `Ok(None)` means leave it untouched; `Ok(Some(_))` is the wrapped
    /// replacement.
    pub(crate) fn rewrite_reference(
        &self,
        raw: &str,
        base: &Url,
        same_host: SameHost,
    ) -> Result<Option<String>, RewriteFailure> {
        let reference = raw.trim();
        if reference.is_empty() || reference.starts_with('#') {
            return Ok(None);
        }

        let absolute = match scheme_of(reference) {
            Some(scheme) if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") => true,
            Some(_) => return Ok(None),
            None => reference.starts_with("//"),
        };

        let resolved = if absolute && !reference.starts_with("//") {
            Url::parse(reference)
        } else {
            base.join(reference)
        }
        .map_err(|e| RewriteFailure {
            reference: reference.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(resolved.scheme(), "http" | "https") || self.is_proxied(&resolved) {
            return Ok(None);
        }
        if absolute && same_host == SameHost::Skip && resolved.host_str() == self.base.host_str() {
            return Ok(None);
        }

        Ok(Some(self.wrap(&resolved)))
    }
}

/// The scheme of an absolute reference, if it has one.
fn scheme_of(reference: &str) -> Option<&str> {
    let colon = reference.find(':')?;
    let scheme = &reference[..colon];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some(scheme)
    } else {
        None
    }
}

/// Decode the `&amp;` entity, the only one that routinely appears in URLs.
pub(crate) fn decode_amp(value: &str) -> std::borrow::Cow<'_, str> {
    if value.contains("&amp;") {
        std::borrow::Cow::Owned(value.replace("&amp;", "&"))
    } else {
        std::borrow::Cow::Borrowed(value)
    }
}

/// A byte range of the source and its replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Edit {
    pub range: Range<usize>,
    pub replacement: String,
}

/// Collects edits and failures while a scanner walks a document.
#[derive(Debug, Default)]
pub(crate) struct Collector {
    edits: Vec<Edit>,
    rewritten: usize,
    failures: Vec<RewriteFailure>,
}

impl Collector {
    /// Consider the reference at `range` of `text`.
    pub fn reference(
        &mut self,
        text: &str,
        range: Range<usize>,
        ctx: &RewriteContext,
        base: &Url,
        same_host: SameHost,
    ) {
        let raw = decode_amp(&text[range.clone()]);
        match ctx.rewrite_reference(&raw, base, same_host) {
            Ok(Some(replacement)) => self.edits.push(Edit { range, replacement }),
            Ok(None) => {}
            Err(failure) => self.failures.push(failure),
        }
    }

    /// Apply the pending edits to `text`. `None` when nothing changed.
    pub fn splice(&mut self, text: &str) -> Option<String> {
        if self.edits.is_empty() {
            return None;
        }
        let edits = std::mem::take(&mut self.edits);
        self.rewritten += edits.len();
        Some(apply_edits(text, edits))
    }

    pub fn fail(&mut self, reference: &str, reason: impl Into<String>) {
        self.failures.push(RewriteFailure {
            reference: reference.to_string(),
            reason: reason.into(),
        });
    }

    /// Outcome for a document whose edits were spliced into `text`.
    pub fn finish(mut self, text: &str) -> RewriteOutcome {
        let text = self.splice(text).unwrap_or_else(|| text.to_string());
        self.finish_with(text)
    }

    /// Outcome for a document whose final text was produced elsewhere.
    pub fn finish_with(self, text: String) -> RewriteOutcome {
        RewriteOutcome {
            text,
            rewritten: self.rewritten,
            failures: self.failures,
        }
    }
}

/// Splice edits into `text` in one pass. Overlapping edits are dropped.
pub(crate) fn apply_edits(text: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| e.range.start);

    let extra: usize = edits.iter().map(|e| e.replacement.len()).sum();
    let mut out = String::with_capacity(text.len() + extra);
    let mut cursor = 0;
    for edit in edits {
        if edit.range.start < cursor || edit.range.end > text.len() {
            continue;
        }
        out.push_str(&text[cursor..edit.range.start]);
        out.push_str(&edit.replacement);
        cursor = edit.range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Rewrite every reference in `text` according to `dialect`.
pub fn rewrite(text: &str, ctx: &RewriteContext, dialect: Dialect) -> RewriteOutcome {
    match dialect {
        Dialect::Html => html::rewrite_html(text, ctx),
        Dialect::Manifest => manifest::rewrite_manifest(text, ctx),
    }
}
