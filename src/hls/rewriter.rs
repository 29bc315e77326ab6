//! Line-oriented playlist rewriting.
//!
//! Every reference a playlist makes (variant streams, segments, audio and
//! subtitle renditions) is turned into a proxy URL pointing back at this
//! service, carrying the caller's header bundle along. The playlist is not
//! parsed as HLS: each line is matched against a fixed, ordered rule list and
//! everything that matches nothing is emitted byte-for-byte.
//!
//! Nested playlists are not fetched here. A rewritten variant URL is only
//! requested (and rewritten in turn) when a player asks for it, so recursion
//! depth is whatever the player actually walks.

use crate::error::{ProxyError, Result};
use crate::hls::language::normalize_language;
use crate::hls::proxy_url::ProxyUrlBuilder;
use crate::hls::resolve::{manifest_base, resolve};
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

static URI_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"URI="([^"]+)""#).expect("valid URI attribute regex"));

static SEGMENT_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(jpg|jpeg|png|mp4|ts|html|js)(\?.*)?$").expect("valid segment regex")
});

/// Which rule rewrote a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestLine {
    /// `LANGUAGE="xxx"` shortened to two letters
    LanguageAttribute,
    /// `URI="..."` attribute wrapped in a proxy URL
    MediaUriAttribute,
    /// Relative media file resolved against the manifest directory
    SegmentFilename,
    /// Absolute `http(s)` reference
    AbsoluteUrl,
    /// Emitted unchanged
    Passthrough,
}

/// A single rewrite rule. Attribute rules edit part of a line and let later
/// rules run; terminal rules replace the whole line and stop.
struct Rule {
    kind: ManifestLine,
    terminal: bool,
    apply: fn(&ManifestRewriter<'_>, &str) -> Option<String>,
}

/// Applied in this order to every line
const RULES: &[Rule] = &[
    Rule {
        kind: ManifestLine::LanguageAttribute,
        terminal: false,
        apply: language_attribute,
    },
    Rule {
        kind: ManifestLine::MediaUriAttribute,
        terminal: false,
        apply: media_uri_attribute,
    },
    Rule {
        kind: ManifestLine::SegmentFilename,
        terminal: true,
        apply: segment_filename,
    },
    Rule {
        kind: ManifestLine::AbsoluteUrl,
        terminal: true,
        apply: absolute_url,
    },
];

/// Per-kind counts of rewritten lines, for logs and metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub lines: usize,
    pub languages: usize,
    pub media_uris: usize,
    pub segments: usize,
    pub absolute_urls: usize,
}

impl RewriteStats {
    fn record(&mut self, kind: ManifestLine) {
        match kind {
            ManifestLine::LanguageAttribute => self.languages += 1,
            ManifestLine::MediaUriAttribute => self.media_uris += 1,
            ManifestLine::SegmentFilename => self.segments += 1,
            ManifestLine::AbsoluteUrl => self.absolute_urls += 1,
            ManifestLine::Passthrough => {}
        }
    }

    pub fn rewritten_references(&self) -> usize {
        self.media_uris + self.segments + self.absolute_urls
    }
}

/// Rewrites one manifest fetched from `target`
pub struct ManifestRewriter<'a> {
    target: &'a Url,
    base: Url,
    urls: ProxyUrlBuilder<'a>,
}

impl<'a> ManifestRewriter<'a> {
    /// # Arguments
    /// * `target` - URL the manifest was fetched from
    /// * `base_url` - optional absolute prefix for proxy URLs (`""` for root-relative)
    /// * `raw_headers` - inbound `headers` parameter, forwarded unchanged
    pub fn new(target: &'a Url, base_url: &'a str, raw_headers: Option<&'a str>) -> Result<Self> {
        let base_str = manifest_base(target);
        let base = Url::parse(&base_str).map_err(|e| {
            ProxyError::Internal(format!("Manifest base {} did not parse: {}", base_str, e))
        })?;

        Ok(Self {
            target,
            base,
            urls: ProxyUrlBuilder::new(base_url, raw_headers),
        })
    }

    /// Directory all relative references resolve against
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Rewrite a full manifest. Output has exactly as many lines as the
    /// input, in the same order, joined with `\n`.
    pub fn rewrite(&self, manifest: &str) -> (String, RewriteStats) {
        let mut stats = RewriteStats::default();

        let lines: Vec<String> = manifest
            .split('\n')
            .map(|line| {
                stats.lines += 1;
                // Keep CRLF playlists CRLF
                let (content, cr) = match line.strip_suffix('\r') {
                    Some(content) => (content, "\r"),
                    None => (line, ""),
                };
                let mut rewritten = self.rewrite_line(content, &mut stats);
                rewritten.push_str(cr);
                rewritten
            })
            .collect();

        debug!(
            "Rewrote manifest from {}: {} lines, {} references, {} languages",
            self.target,
            stats.lines,
            stats.rewritten_references(),
            stats.languages
        );

        (lines.join("\n"), stats)
    }

    /// Run every rule over a single line (without its terminator)
    pub fn rewrite_line(&self, line: &str, stats: &mut RewriteStats) -> String {
        let mut current = Cow::Borrowed(line);

        for rule in RULES {
            if let Some(replacement) = (rule.apply)(self, &current) {
                stats.record(rule.kind);
                current = Cow::Owned(replacement);
                if rule.terminal {
                    break;
                }
            }
        }

        current.into_owned()
    }

    /// Tag a line with the first rule that would touch it
    pub fn classify_line(&self, line: &str) -> ManifestLine {
        RULES
            .iter()
            .find(|rule| (rule.apply)(self, line).is_some())
            .map_or(ManifestLine::Passthrough, |rule| rule.kind)
    }
}

fn language_attribute(_rw: &ManifestRewriter<'_>, line: &str) -> Option<String> {
    match normalize_language(line) {
        Cow::Owned(rewritten) => Some(rewritten),
        Cow::Borrowed(_) => None,
    }
}

/// The attribute value is forwarded as the target verbatim, unresolved.
fn media_uri_attribute(rw: &ManifestRewriter<'_>, line: &str) -> Option<String> {
    let caps = URI_ATTR.captures(line)?;
    let token = caps.get(0)?;
    let proxied = rw.urls.build(&caps[1]);

    let mut rewritten = String::with_capacity(line.len() + proxied.len());
    rewritten.push_str(&line[..token.start()]);
    rewritten.push_str("URI=\"");
    rewritten.push_str(&proxied);
    rewritten.push('"');
    rewritten.push_str(&line[token.end()..]);
    Some(rewritten)
}

fn segment_filename(rw: &ManifestRewriter<'_>, line: &str) -> Option<String> {
    let filename = line.trim();
    if is_directive(filename) || has_http_scheme(filename) {
        return None;
    }
    if !SEGMENT_FILENAME.is_match(filename) {
        return None;
    }

    match resolve(filename, &rw.base) {
        Ok(resolved) => Some(rw.urls.build(resolved.as_str())),
        Err(e) => {
            warn!("Could not resolve segment {:?} against {}: {}", filename, rw.base, e);
            None
        }
    }
}

fn absolute_url(rw: &ManifestRewriter<'_>, line: &str) -> Option<String> {
    if is_directive(line) || !has_http_scheme(line.trim()) {
        return None;
    }

    match resolve(line, rw.target) {
        Ok(resolved) => Some(rw.urls.build(resolved.as_str())),
        Err(e) => {
            warn!("Could not resolve reference {:?}: {}", line, e);
            None
        }
    }
}

fn is_directive(line: &str) -> bool {
    line.starts_with('#')
}

fn has_http_scheme(line: &str) -> bool {
    let lower = line.get(..8).unwrap_or(line).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
