//! Protect/restore of `<!--[minify_skip]-->` regions.
//!
//! Before a page goes through a content-agnostic minifier, every region
//! delimited by a skip marker pair is swapped out for an opaque placeholder
//! token. After minification the tokens are swapped back for the original
//! bytes, so the minifier never sees (and cannot damage) protected content:
//!
//! ```text
//! <p>a</p><!--[minify_skip]-->  keep  <!--[/minify_skip]-->
//!   -> protect ->  <p>a</p>X_minify_skip_<nonce>_0_X
//!   -> minify  ->  <p>a</p>X_minify_skip_<nonce>_0_X
//!   -> restore ->  <p>a</p>  keep
//! ```
//!
//! Matching is a single left-to-right scan, no regex involved. The first
//! close marker after an open marker ends the region; nesting is not
//! supported.

use std::collections::HashMap;

use crate::Result;

/// Tag name used by the default markers.
pub const DEFAULT_TAG: &str = "minify_skip";

/// Default upper bound on the length of a protected region's content.
pub const DEFAULT_MAX_REGION_LEN: usize = 4 * 1024 * 1024;

/// Every placeholder starts with this, followed by the per-call nonce.
const PLACEHOLDER_PREFIX: &str = "X_minify_skip_";
const PLACEHOLDER_SUFFIX: &str = "_X";
const NONCE_LEN: usize = 16;

/// The marker pair delimiting protected regions.
///
/// With the default tag the pair is `<!--[minify_skip]-->` and
/// `<!--[/minify_skip]-->`. The tag is matched ASCII case-insensitively and
/// whitespace is allowed after `<!--` and before `-->`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipMarkers {
    tag: String,
    max_region_len: usize,
    keep_markers: bool,
}

impl Default for SkipMarkers {
    fn default() -> Self {
        Self::new(DEFAULT_TAG)
    }
}

impl SkipMarkers {
    /// Markers `<!--[tag]-->` / `<!--[/tag]-->`.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            max_region_len: DEFAULT_MAX_REGION_LEN,
            keep_markers: false,
        }
    }

    /// An open marker whose close is more than `len` bytes away is left
    /// unprotected.
    pub fn with_max_region_len(mut self, len: usize) -> Self {
        self.max_region_len = len;
        self
    }

    /// Put the marker comments back around restored content instead of
    /// dropping them.
    pub fn keep_markers(mut self, keep: bool) -> Self {
        self.keep_markers = keep;
        self
    }

    /// Tag name between the brackets, without the `/` of the close marker.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Longest region content, in bytes, that is still protected.
    pub fn max_region_len(&self) -> usize {
        self.max_region_len
    }
}

/// One region swapped out of the text by [`protect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedRegion {
    placeholder: String,
    content: String,
    /// Literal open/close marker text, when markers are kept.
    markers: Option<(String, String)>,
}

impl ProtectedRegion {
    /// Token standing in for the region in the protected text.
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// The bytes strictly between the markers.
    pub fn content(&self) -> &str {
        &self.content
    }

    fn write_original(&self, out: &mut String) {
        match &self.markers {
            Some((open, close)) => {
                out.push_str(open);
                out.push_str(&self.content);
                out.push_str(close);
            }
            None => out.push_str(&self.content),
        }
    }
}

/// Result of [`protect`]: the text with placeholders plus the regions needed
/// to undo it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protected {
    pub text: String,
    pub regions: Vec<ProtectedRegion>,
    nonce: Option<String>,
}

impl Protected {
    /// Swap the placeholders in `text` back for their regions.
    pub fn restore(&self, text: &str) -> String {
        restore(text, &self.regions)
    }

    /// Whether `output` still carries a token from this call, i.e. the
    /// minifier altered a placeholder so that it could not be restored.
    pub fn has_residue(&self, output: &str) -> bool {
        self.nonce
            .as_deref()
            .is_some_and(|nonce| output.contains(nonce))
    }
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    start: usize,
    end: usize,
}

/// Replace every marker-delimited region of `text` with a unique placeholder.
///
/// An open marker without a close marker within `max_region_len` bytes is
/// ordinary text. Text without markers comes back unchanged with no regions.
pub fn protect(text: &str, markers: &SkipMarkers) -> Result<Protected> {
    let mut out = String::new();
    let mut regions = Vec::new();
    let mut nonce_slot: Option<String> = None;

    let mut last = 0;
    let mut cursor = 0;
    // The first close marker after a position only moves forward, so a
    // close found for an earlier open is reused for later opens before it.
    let mut next_close: Option<Marker> = None;

    while let Some(open) = find_marker(text, cursor, &markers.tag, false) {
        let close = match next_close {
            Some(close) if close.start >= open.end => Some(close),
            _ => find_marker(text, open.end, &markers.tag, true),
        };
        let Some(close) = close else {
            tracing::debug!(offset = open.start, "unterminated skip marker, leaving rest unprotected");
            break;
        };
        next_close = Some(close);

        if close.start - open.end > markers.max_region_len {
            tracing::debug!(
                offset = open.start,
                len = close.start - open.end,
                max = markers.max_region_len,
                "skip region too long, leaving open marker unprotected"
            );
            cursor = open.end;
            continue;
        }

        let nonce: &str = match &mut nonce_slot {
            Some(nonce) => nonce,
            slot => slot.insert(draw_nonce(text)?),
        };
        let placeholder = format!(
            "{PLACEHOLDER_PREFIX}{nonce}_{}{PLACEHOLDER_SUFFIX}",
            regions.len()
        );

        out.push_str(&text[last..open.start]);
        out.push_str(&placeholder);
        regions.push(ProtectedRegion {
            placeholder,
            content: text[open.end..close.start].to_owned(),
            markers: markers.keep_markers.then(|| {
                (
                    text[open.start..open.end].to_owned(),
                    text[close.start..close.end].to_owned(),
                )
            }),
        });

        last = close.end;
        cursor = close.end;
    }

    if regions.is_empty() {
        return Ok(Protected {
            text: text.to_owned(),
            regions,
            nonce: None,
        });
    }

    out.push_str(&text[last..]);
    Ok(Protected {
        text: out,
        regions,
        nonce: nonce_slot,
    })
}

/// Replace every exact occurrence of each region's placeholder in `text`
/// with the region's original content.
///
/// Tokens that were altered (split, re-cased, truncated) are not recognized
/// and stay in the output as they are.
pub fn restore(text: &str, regions: &[ProtectedRegion]) -> String {
    if regions.is_empty() {
        return text.to_owned();
    }

    let lookup: HashMap<&str, &ProtectedRegion> = regions
        .iter()
        .map(|region| (region.placeholder.as_str(), region))
        .collect();

    let extra: usize = regions.iter().map(|r| r.content.len()).sum();
    let mut out = String::with_capacity(text.len() + extra);
    let mut last = 0;
    let mut pos = 0;

    while let Some(offset) = text[pos..].find(PLACEHOLDER_PREFIX) {
        let start = pos + offset;
        let found = token_end(text.as_bytes(), start)
            .and_then(|end| lookup.get(&text[start..end]).map(|region| (end, *region)));

        match found {
            Some((end, region)) => {
                out.push_str(&text[last..start]);
                region.write_original(&mut out);
                last = end;
                pos = end;
            }
            None => pos = start + PLACEHOLDER_PREFIX.len(),
        }
    }

    out.push_str(&text[last..]);
    out
}

/// Every well-formed placeholder token in `text`, from any [`protect`] call.
pub fn placeholders(text: &str) -> impl Iterator<Item = &str> + '_ {
    let mut pos = 0;
    std::iter::from_fn(move || {
        while let Some(offset) = text[pos..].find(PLACEHOLDER_PREFIX) {
            let start = pos + offset;
            match token_end(text.as_bytes(), start) {
                Some(end) => {
                    pos = end;
                    return Some(&text[start..end]);
                }
                None => pos = start + PLACEHOLDER_PREFIX.len(),
            }
        }
        None
    })
}

/// Whether `text` holds a placeholder, i.e. part of it is protected content
/// that a minifier must copy rather than rewrite.
pub fn contains_placeholder(text: &str) -> bool {
    placeholders(text).next().is_some()
}

/// End offset of a well-formed placeholder starting at `start`.
fn token_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + PLACEHOLDER_PREFIX.len();

    let nonce = bytes.get(i..i + NONCE_LEN)?;
    if !nonce.iter().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }
    i += NONCE_LEN;

    if bytes.get(i) != Some(&b'_') {
        return None;
    }
    i += 1;

    let digits = bytes[i..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    i += digits;

    if bytes.get(i..i + PLACEHOLDER_SUFFIX.len())? != PLACEHOLDER_SUFFIX.as_bytes() {
        return None;
    }
    Some(i + PLACEHOLDER_SUFFIX.len())
}

/// 16 hex digits from the OS entropy source that do not occur in `text`.
fn draw_nonce(text: &str) -> Result<String> {
    loop {
        let mut buf = [0u8; 8];
        getrandom::fill(&mut buf)?;
        let nonce = format!("{:016x}", u64::from_le_bytes(buf));
        if !text.contains(&nonce) {
            return Ok(nonce);
        }
    }
}

/// First open (or close) marker at or after byte offset `from`.
fn find_marker(text: &str, from: usize, tag: &str, closing: bool) -> Option<Marker> {
    let mut pos = from;
    while let Some(offset) = text[pos..].find("<!--") {
        let start = pos + offset;
        if let Some(end) = match_marker(text.as_bytes(), start, tag, closing) {
            return Some(Marker { start, end });
        }
        pos = start + 4;
    }
    None
}

/// Matches `<!--` ws* `[` `/`? tag `]` ws* `-->` at `start`, returning the
/// end offset.
fn match_marker(bytes: &[u8], start: usize, tag: &str, closing: bool) -> Option<usize> {
    let mut i = skip_whitespace(bytes, start + 4);

    if bytes.get(i) != Some(&b'[') {
        return None;
    }
    i += 1;

    if closing {
        if bytes.get(i) != Some(&b'/') {
            return None;
        }
        i += 1;
    }

    if !bytes.get(i..i + tag.len())?.eq_ignore_ascii_case(tag.as_bytes()) {
        return None;
    }
    i += tag.len();

    if bytes.get(i) != Some(&b']') {
        return None;
    }
    i = skip_whitespace(bytes, i + 1);

    if bytes.get(i..i + 3)? != b"-->" {
        return None;
    }
    Some(i + 3)
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: &str = "<!--[minify_skip]-->";
    const CLOSE: &str = "<!--[/minify_skip]-->";

    fn protect_default(text: &str) -> Protected {
        protect(text, &SkipMarkers::default()).unwrap()
    }

    #[test]
    fn test_no_markers_is_identity() {
        let html = "<p>  a  </p><!-- just a comment -->";
        let protected = protect_default(html);

        assert_eq!(protected.text, html);
        assert!(protected.regions.is_empty());
        assert_eq!(protected.restore(&protected.text), html);
    }

    #[test]
    fn test_single_region_replaced_by_placeholder() {
        let html = format!("<p>a</p>{OPEN}  keep  {CLOSE}<p>b</p>");
        let protected = protect_default(&html);

        assert_eq!(protected.regions.len(), 1);
        let region = &protected.regions[0];
        assert_eq!(region.content(), "  keep  ");
        assert_eq!(
            protected.text,
            format!("<p>a</p>{}<p>b</p>", region.placeholder())
        );
        assert!(!protected.text.contains("minify_skip]"));
    }

    #[test]
    fn test_round_trip_drops_markers() {
        let html = format!("a{OPEN} x  y {CLOSE}b");
        let protected = protect_default(&html);
        assert_eq!(protected.restore(&protected.text), "a x  y b");
    }

    #[test]
    fn test_round_trip_with_kept_markers_is_exact() {
        let html = format!("a{OPEN} x  y {CLOSE}b<!-- [MINIFY_SKIP] -->z<!--[/minify_skip]  -->");
        let markers = SkipMarkers::default().keep_markers(true);
        let protected = protect(&html, &markers).unwrap();

        assert_eq!(protected.regions.len(), 2);
        assert_eq!(protected.restore(&protected.text), html);
    }

    #[test]
    fn test_placeholder_is_inert() {
        let protected = protect_default(&format!("{OPEN}x{CLOSE}"));
        let placeholder = protected.regions[0].placeholder();

        assert!(placeholder.starts_with(PLACEHOLDER_PREFIX));
        assert!(placeholder.ends_with("_0_X"));
        assert!(
            placeholder
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        );
    }

    #[test]
    fn test_case_and_whitespace_tolerant_markers() {
        let html = "<!--  [Minify_Skip]\n-->kept<!--\t[/MINIFY_SKIP] -->";
        let protected = protect_default(html);

        assert_eq!(protected.regions.len(), 1);
        assert_eq!(protected.regions[0].content(), "kept");
    }

    #[test]
    fn test_first_close_ends_region_and_nesting_is_literal() {
        let html = format!("{OPEN}a{OPEN}b{CLOSE}c{CLOSE}");
        let protected = protect_default(&html);

        assert_eq!(protected.regions.len(), 1);
        assert_eq!(protected.regions[0].content(), format!("a{OPEN}b"));
        // The stray close marker after the region is just text
        assert!(protected.text.ends_with(&format!("c{CLOSE}")));
    }

    #[test]
    fn test_unterminated_marker_leaves_rest_unprotected() {
        let html = format!("<p>x</p>{OPEN}  never closed  <p>y</p>");
        let protected = protect_default(&html);

        assert!(protected.regions.is_empty());
        assert_eq!(protected.text, html);
    }

    #[test]
    fn test_unterminated_after_valid_region() {
        let html = format!("{OPEN}one{CLOSE} mid {OPEN} dangling");
        let protected = protect_default(&html);

        assert_eq!(protected.regions.len(), 1);
        assert!(protected.text.ends_with(&format!(" mid {OPEN} dangling")));
    }

    #[test]
    fn test_region_over_length_bound_is_unprotected() {
        let markers = SkipMarkers::default().with_max_region_len(4);
        let html = format!("{OPEN}too long{CLOSE}{OPEN}ok{CLOSE}");
        let protected = protect(&html, &markers).unwrap();

        // The first open marker stays literal, scanning resumes after it
        assert_eq!(protected.regions.len(), 1);
        assert_eq!(protected.regions[0].content(), "ok");
        assert!(protected.text.starts_with(&format!("{OPEN}too long")));
    }

    #[test]
    fn test_empty_region() {
        let html = format!("a{OPEN}{CLOSE}b");
        let protected = protect_default(&html);

        assert_eq!(protected.regions.len(), 1);
        assert_eq!(protected.restore(&protected.text), "ab");
    }

    #[test]
    fn test_multiple_regions_keep_order() {
        let html = format!("{OPEN}first{CLOSE} - {OPEN}second{CLOSE} - {OPEN}third{CLOSE}");
        let protected = protect_default(&html);

        let contents: Vec<_> = protected.regions.iter().map(|r| r.content()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
        assert_eq!(protected.restore(&protected.text), "first - second - third");
    }

    #[test]
    fn test_many_regions_do_not_collide_on_prefix() {
        let html: String = (0..12).map(|i| format!("{OPEN}r{i}{CLOSE}|")).collect();
        let protected = protect_default(&html);

        assert_eq!(protected.regions.len(), 12);
        let expected: String = (0..12).map(|i| format!("r{i}|")).collect();
        assert_eq!(protected.restore(&protected.text), expected);
    }

    #[test]
    fn test_duplicated_placeholder_restored_everywhere() {
        let protected = protect_default(&format!("{OPEN}dup{CLOSE}"));
        let placeholder = protected.regions[0].placeholder().to_owned();

        let doubled = format!("{placeholder} and {placeholder}");
        assert_eq!(protected.restore(&doubled), "dup and dup");
    }

    #[test]
    fn test_mangled_placeholder_left_verbatim() {
        let protected = protect_default(&format!("{OPEN}gone{CLOSE}"));
        let placeholder = protected.regions[0].placeholder();

        let mangled = placeholder.replacen("_0_X", "_0 _X", 1);
        let output = protected.restore(&mangled);

        assert_eq!(output, mangled);
        assert!(protected.has_residue(&output));
    }

    #[test]
    fn test_foreign_placeholder_shaped_text_untouched() {
        let stranger = "X_minify_skip_0123456789abcdef_0_X";
        let html = format!("{stranger}{OPEN}mine{CLOSE}");
        let protected = protect_default(&html);

        assert_eq!(protected.restore(&protected.text), format!("{stranger}mine"));
    }

    #[test]
    fn test_restored_content_is_not_interpreted() {
        let html = format!("{OPEN}$1 \\0 {{}} X_minify_skip_{CLOSE}");
        let protected = protect_default(&html);

        assert_eq!(protected.restore(&protected.text), "$1 \\0 {} X_minify_skip_");
    }

    #[test]
    fn test_non_ascii_content_survives() {
        let html = format!("héllo {OPEN}  日本語  {CLOSE} wörld");
        let protected = protect_default(&html);

        assert_eq!(protected.restore(&protected.text), "héllo   日本語   wörld");
    }

    #[test]
    fn test_custom_tag() {
        let markers = SkipMarkers::new("raw");
        let html = "<!--[raw]-->x<!--[/raw]--><!--[minify_skip]-->y<!--[/minify_skip]-->";
        let protected = protect(html, &markers).unwrap();

        assert_eq!(protected.regions.len(), 1);
        assert_eq!(protected.regions[0].content(), "x");
    }

    #[test]
    fn test_placeholders_are_found_in_minified_text() {
        let protected = protect_default(&format!("a{OPEN}x{CLOSE}b{OPEN}y{CLOSE}"));
        let stray = "X_minify_skip_nothex_0_X";
        let text = format!("{} {stray} {}", protected.regions[1].placeholder(), protected.regions[0].placeholder());

        let found: Vec<_> = placeholders(&text).collect();
        assert_eq!(
            found,
            [protected.regions[1].placeholder(), protected.regions[0].placeholder()]
        );
        assert!(contains_placeholder(&protected.text));
        assert!(!contains_placeholder(stray));
        assert!(!contains_placeholder("<p>plain</p>"));
    }

    #[test]
    fn test_each_call_draws_fresh_placeholders() {
        let html = format!("{OPEN}x{CLOSE}");
        let first = protect_default(&html);
        let second = protect_default(&html);

        assert_ne!(first.regions[0].placeholder(), second.regions[0].placeholder());
    }
}
