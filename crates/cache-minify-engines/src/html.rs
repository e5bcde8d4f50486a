//! HTML minification via [`minify_html`].
//!
//! minify-html runs with its own CSS/JS minification turned off, so `<style>`
//! and `<script>` bodies are left as they are by it. Those bodies are run
//! through the injected [`Embedded`] minifiers first, unless they hold a
//! skip-region placeholder, in which case they are copied untouched.
//!
//! minify-html drops the quotes of attribute values it considers safe, and a
//! bare placeholder is always safe. Such values get their original quotes
//! back so the restored content stays inside the attribute.

use std::collections::HashMap;
use std::sync::LazyLock;

use cache_minify::skip::{contains_placeholder, placeholders};
use cache_minify::{Embedded, HtmlMinifier, MinifyError};
use minify_html::{Cfg, minify};
use regex::Regex;

/// `type` attribute of an opening tag.
static TYPE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|\s)type\s*=\s*["']?\s*([^"'\s>]+)"#).expect("valid regex")
});

/// Script `type` values holding JavaScript.
const JS_TYPES: &[&str] = &[
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "text/ecmascript",
    "application/ecmascript",
    "module",
];

/// HTML minifier backed by minify-html.
pub struct MinifyHtmlEngine {
    cfg: Cfg,
}

impl Default for MinifyHtmlEngine {
    fn default() -> Self {
        Self::new(Cfg::default())
    }
}

impl MinifyHtmlEngine {
    /// Engine with the given minify-html settings. CSS/JS minification is
    /// always left to the injected minifiers.
    pub fn new(cfg: Cfg) -> Self {
        Self {
            cfg: Cfg {
                minify_css: false,
                minify_js: false,
                ..cfg
            },
        }
    }
}

impl HtmlMinifier for MinifyHtmlEngine {
    fn minify_html(&self, html: &str, embedded: &Embedded<'_>) -> Result<String, MinifyError> {
        let delegated = minify_embedded(html, embedded)?;
        let result = minify(delegated.as_bytes(), &self.cfg);
        let minified = String::from_utf8(result)
            .map_err(|_| MinifyError::new("html", "minification produced invalid UTF-8"))?;
        Ok(requote_placeholders(html, minified))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Style,
    Script,
}

impl Element {
    fn open(self) -> &'static str {
        match self {
            Element::Style => "<style",
            Element::Script => "<script",
        }
    }

    fn close(self) -> &'static str {
        match self {
            Element::Style => "</style",
            Element::Script => "</script",
        }
    }

    /// Whether an element with this opening tag holds code we can minify.
    fn is_minifiable(self, open_tag: &str) -> bool {
        match self {
            Element::Style => true,
            Element::Script => match TYPE_ATTR.captures(open_tag) {
                None => true,
                Some(caps) => {
                    let ty = &caps[1];
                    JS_TYPES.iter().any(|js| ty.eq_ignore_ascii_case(js))
                }
            },
        }
    }
}

/// Run `<style>` bodies through `embedded.css` and JavaScript `<script>`
/// bodies through `embedded.js`. Everything else is copied as is.
pub(crate) fn minify_embedded(html: &str, embedded: &Embedded<'_>) -> Result<String, MinifyError> {
    // Same byte offsets as `html`, only ASCII letters change
    let lower = html.to_ascii_lowercase();

    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    let mut pos = 0;

    while let Some((start, element)) = next_element(&lower, pos) {
        let Some(body_start) = lower[start..].find('>').map(|i| start + i + 1) else {
            break;
        };
        let Some(body_end) = lower[body_start..].find(element.close()).map(|i| body_start + i) else {
            break;
        };

        let body = &html[body_start..body_end];
        if contains_placeholder(body) {
            tracing::debug!(offset = body_start, "embedded body holds a skip region, copying it as is");
        } else if !body.trim().is_empty() && element.is_minifiable(&html[start..body_start]) {
            let minified = match element {
                Element::Style => embedded.css.minify_css(body)?,
                Element::Script => embedded.js.minify_js(body)?,
            };
            out.push_str(&html[last..body_start]);
            out.push_str(&minified);
            last = body_end;
        }

        pos = body_end + element.close().len();
    }

    out.push_str(&html[last..]);
    Ok(out)
}

/// Earliest `<style` or `<script` opening tag at or after `from`.
fn next_element(lower: &str, from: usize) -> Option<(usize, Element)> {
    [Element::Style, Element::Script]
        .into_iter()
        .filter_map(|element| find_tag(lower, from, element.open()).map(|i| (i, element)))
        .min_by_key(|(i, _)| *i)
}

fn find_tag(lower: &str, from: usize, tag: &str) -> Option<usize> {
    let mut pos = from;
    while let Some(offset) = lower[pos..].find(tag) {
        let start = pos + offset;
        let next = lower.as_bytes().get(start + tag.len()).copied();
        // `<styles>` or `<scripted>` are other elements
        if matches!(next, Some(b'>' | b'/') | Some(b' ' | b'\t' | b'\n' | b'\r' | b'\x0c')) {
            return Some(start);
        }
        pos = start + tag.len();
    }
    None
}

/// Byte range of one attribute value, without its quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttrValue {
    start: usize,
    end: usize,
    quote: Option<u8>,
}

/// Attribute values of every start tag in `html`. Comments, end tags and the
/// bodies of `<script>`/`<style>` are skipped.
fn attribute_values(html: &str) -> Vec<AttrValue> {
    let bytes = html.as_bytes();
    let len = bytes.len();
    let mut values = Vec::new();
    let mut lower: Option<String> = None;
    let mut pos = 0;

    while let Some(offset) = html[pos..].find('<') {
        let lt = pos + offset;
        let rest = &bytes[lt + 1..];

        if rest.starts_with(b"!--") {
            pos = html[lt + 4..].find("-->").map_or(len, |i| lt + 4 + i + 3);
            continue;
        }
        if matches!(rest.first(), Some(b'/' | b'!' | b'?')) {
            pos = html[lt + 1..].find('>').map_or(len, |i| lt + 1 + i + 1);
            continue;
        }
        if !rest.first().is_some_and(u8::is_ascii_alphabetic) {
            pos = lt + 1;
            continue;
        }

        let name_start = lt + 1;
        let mut i = name_start;
        while i < len && !is_space(bytes[i]) && !matches!(bytes[i], b'>' | b'/') {
            i += 1;
        }
        let name = &html[name_start..i];

        loop {
            while i < len && (is_space(bytes[i]) || bytes[i] == b'/') {
                i += 1;
            }
            if i >= len {
                break;
            }
            if bytes[i] == b'>' {
                i += 1;
                break;
            }

            while i < len && !is_space(bytes[i]) && !matches!(bytes[i], b'=' | b'>' | b'/') {
                i += 1;
            }
            while i < len && is_space(bytes[i]) {
                i += 1;
            }
            if bytes.get(i) != Some(&b'=') {
                continue;
            }
            i += 1;
            while i < len && is_space(bytes[i]) {
                i += 1;
            }

            match bytes.get(i) {
                Some(&quote @ (b'"' | b'\'')) => {
                    let start = i + 1;
                    let end = html[start..].find(quote as char).map_or(len, |e| start + e);
                    values.push(AttrValue {
                        start,
                        end,
                        quote: Some(quote),
                    });
                    i = (end + 1).min(len);
                }
                Some(_) => {
                    let start = i;
                    while i < len && !is_space(bytes[i]) && bytes[i] != b'>' {
                        i += 1;
                    }
                    values.push(AttrValue {
                        start,
                        end: i,
                        quote: None,
                    });
                }
                None => break,
            }
        }
        pos = i;

        if let Some(element) = [Element::Style, Element::Script]
            .into_iter()
            .find(|element| name.eq_ignore_ascii_case(&element.open()[1..]))
        {
            let lower = lower.get_or_insert_with(|| html.to_ascii_lowercase());
            pos = lower[pos..].find(element.close()).map_or(len, |i| pos + i);
        }
    }

    values
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c')
}

/// Put back the quotes minify-html removed from attribute values that hold a
/// placeholder.
///
/// The quote character is the one the value used in `input`. Content that
/// was protected inside a quoted value cannot contain that quote, so after
/// restore the value ends where it did in the source.
fn requote_placeholders(input: &str, minified: String) -> String {
    let mut quotes: HashMap<&str, u8> = HashMap::new();
    for value in attribute_values(input) {
        if let Some(quote) = value.quote {
            for token in placeholders(&input[value.start..value.end]) {
                quotes.insert(token, quote);
            }
        }
    }
    if quotes.is_empty() {
        return minified;
    }

    let mut out = String::with_capacity(minified.len() + 2 * quotes.len());
    let mut last = 0;

    for value in attribute_values(&minified) {
        let text = &minified[value.start..value.end];
        let Some(quote) = placeholders(text).find_map(|token| quotes.get(token).copied()) else {
            continue;
        };
        if value.quote == Some(quote) || text.as_bytes().contains(&quote) {
            continue;
        }

        let (outer_start, outer_end) = match value.quote {
            Some(_) if value.end >= minified.len() => continue,
            Some(_) => (value.start - 1, value.end + 1),
            None => (value.start, value.end),
        };
        out.push_str(&minified[last..outer_start]);
        out.push(quote as char);
        out.push_str(text);
        out.push(quote as char);
        last = outer_end;
    }

    out.push_str(&minified[last..]);
    out
}
