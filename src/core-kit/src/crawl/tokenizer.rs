//! A single forward scan over raw HTML that yields each open tag with its attributes.
//!
//! Only enough of HTML is modelled to read attribute values safely: declarations,
//! CDATA and comments are skipped, and `<script>`/`<style>` content is never scanned as
//! markup. Malformed or truncated markup ends a tag early and never fails the scan.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::crawl::{CrawlResult, decode_entities, resolve};

const DOCTYPE: &[u8] = b"DOCTYPE";
const CDATA_OPEN: &[u8] = b"[CDATA[";
const CDATA_CLOSE: &str = "]]>";
const COMMENT_OPEN: &[u8] = b"--";
const COMMENT_CLOSE: &str = "-->";

/// `<meta name|property="...">` values whose `content` is a crawlable URL.
const CRAWLABLE_META_NAMES: &[&str] = &[
    "og:url",
    "og:image",
    "og:image:url",
    "og:image:secure_url",
    "og:video",
    "og:video:url",
    "og:video:secure_url",
    "og:audio",
    "og:audio:url",
    "og:audio:secure_url",
    "twitter:image",
];

static EXTERNAL_REL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bexternal\b").expect("external rel pattern is valid"));

/// Scans `html` for links and fragment targets. `base` is the document's own path and
/// is replaced by any `<base href>` encountered.
pub fn crawl(html: &str, base: &str) -> CrawlResult {
    let mut result = CrawlResult::default();
    let mut base = base.to_string();

    for tag in Scanner::new(html) {
        collect(&tag, &mut base, &mut result);
    }

    result
}

fn collect(tag: &Tag, base: &mut String, result: &mut CrawlResult) {
    let attribute = |name: &str| tag.attributes.get(name).map(String::as_str).filter(|value| !value.is_empty());

    if tag.name == "base" {
        if let Some(resolved) = attribute("href").and_then(|href| resolve(base.as_str(), href)) {
            *base = resolved;
        }
        return;
    }

    let base: &str = base;
    let mut push_resolved = |href: &str| {
        if let Some(resolved) = resolve(base, href) {
            result.hrefs.push(resolved);
        }
    };

    if let Some(href) = attribute("href")
        && !attribute("rel").is_some_and(|rel| EXTERNAL_REL.is_match(rel))
    {
        push_resolved(href);
    }

    if let Some(src) = attribute("src") {
        push_resolved(src);
    }

    if let Some(srcset) = attribute("srcset") {
        for candidate in srcset_urls(srcset) {
            push_resolved(candidate);
        }
    }

    if tag.name == "meta"
        && let Some(content) = attribute("content")
    {
        let key = tag.attributes.get("name").or_else(|| tag.attributes.get("property"));
        if key.is_some_and(|key| CRAWLABLE_META_NAMES.contains(&key.as_str())) {
            push_resolved(content);
        }
    }

    if let Some(id) = attribute("id") {
        result.ids.push(id.to_string());
    }
    if tag.name == "a"
        && let Some(name) = attribute("name")
    {
        result.ids.push(name.to_string());
    }
}

/// Candidate URLs of a `srcset`. A comma separates candidates only once the URL has ended
/// (whitespace was seen) or when whitespace follows it, so `a,b.jpg` stays one URL.
fn srcset_urls(srcset: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    let mut value = srcset.trim();
    let mut inside_url = true;
    let mut i = 0;

    while i < value.len() {
        let bytes = value.as_bytes();
        if bytes[i] == b',' && (!inside_url || bytes.get(i + 1).is_some_and(u8::is_ascii_whitespace)) {
            candidates.push(&value[..i]);
            value = value[i + 1..].trim();
            inside_url = true;
            i = 0;
            continue;
        }
        if bytes[i].is_ascii_whitespace() {
            inside_url = false;
        }
        i += 1;
    }
    candidates.push(value);

    candidates
        .into_iter()
        .filter_map(|candidate| candidate.split_ascii_whitespace().next())
        .collect()
}

/// An open tag. `name` is lowercase; a repeated attribute keeps its last value.
#[derive(Debug)]
struct Tag {
    name: String,
    attributes: HashMap<String, String>,
}

/// Yields open tags in document order.
///
/// Scans bytes but only slices at ASCII structural bytes, so every slice boundary is a
/// UTF-8 char boundary.
struct Scanner<'a> {
    html: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(html: &'a str) -> Self {
        Scanner {
            html,
            bytes: html.as_bytes(),
            pos: 0,
        }
    }

    fn at(&self, pos: usize) -> Option<u8> {
        self.bytes.get(pos).copied()
    }

    fn starts_with(&self, prefix: &[u8], ignore_case: bool) -> bool {
        let Some(slice) = self.bytes.get(self.pos..self.pos + prefix.len()) else {
            return false;
        };
        if ignore_case { slice.eq_ignore_ascii_case(prefix) } else { slice == prefix }
    }

    /// Moves past the next occurrence of `close`, or to the end of input.
    fn skip_past(&mut self, close: &str) {
        self.pos = match self.html[self.pos..].find(close) {
            Some(offset) => self.pos + offset + close.len(),
            None => self.bytes.len(),
        };
    }

    /// Skips `<!DOCTYPE ...>`, `<![CDATA[...]]>` and `<!--...-->`, with `pos` just past `<!`.
    /// Other `<!` constructs are left for the main loop to step over.
    fn skip_declaration(&mut self) {
        if self.starts_with(DOCTYPE, true) {
            self.skip_past(">");
        } else if self.starts_with(CDATA_OPEN, false) {
            self.pos += CDATA_OPEN.len();
            self.skip_past(CDATA_CLOSE);
        } else if self.starts_with(COMMENT_OPEN, false) {
            self.pos += COMMENT_OPEN.len();
            self.skip_past(COMMENT_CLOSE);
        }
    }

    fn skip_whitespace(&mut self) {
        while self.at(self.pos).is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Reads attributes up to the tag's closing `>` (or the end of input), leaving `pos`
    /// on the `>`.
    fn attributes(&mut self) -> HashMap<String, String> {
        let mut attributes = HashMap::new();

        while let Some(b) = self.at(self.pos) {
            if b == b'>' {
                break;
            }
            if !is_attribute_name_byte(b) {
                self.pos += 1;
                continue;
            }

            let start = self.pos;
            while self.at(self.pos).is_some_and(is_attribute_name_byte) {
                self.pos += 1;
            }
            let name = self.html[start..self.pos].to_ascii_lowercase();

            self.skip_whitespace();
            if self.at(self.pos) != Some(b'=') {
                continue;
            }
            self.pos += 1;
            self.skip_whitespace();

            let raw = match self.at(self.pos) {
                Some(quote @ (b'"' | b'\'')) => self.quoted_value(quote),
                _ => self.unquoted_value(),
            };
            attributes.insert(name, decode_entities(raw).into_owned());
        }

        attributes
    }

    /// A quoted value, with `pos` on the opening quote. Backslash-escaped quotes don't end
    /// the value. Leaves `pos` past the closing quote.
    fn quoted_value(&mut self, quote: u8) -> &'a str {
        self.pos += 1;
        let start = self.pos;
        let mut escaped = false;
        while let Some(b) = self.at(self.pos) {
            if escaped {
                escaped = false;
            } else if b == quote {
                break;
            } else if b == b'\\' {
                escaped = true;
            }
            self.pos += 1;
        }
        let value = &self.html[start..self.pos];
        if self.pos < self.bytes.len() {
            self.pos += 1;
        }
        value
    }

    fn unquoted_value(&mut self) -> &'a str {
        let start = self.pos;
        while self.at(self.pos).is_some_and(|b| b != b'>' && !b.is_ascii_whitespace()) {
            self.pos += 1;
        }
        &self.html[start..self.pos]
    }

    /// Moves to the `</name` that closes a raw text element, or to the end of input.
    fn skip_raw_text(&mut self, name: &str) {
        while self.pos < self.bytes.len() {
            let Some(offset) = self.html[self.pos..].find("</") else {
                self.pos = self.bytes.len();
                return;
            };
            self.pos += offset;
            let name_start = self.pos + 2;
            if self
                .bytes
                .get(name_start..name_start + name.len())
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name.as_bytes()))
            {
                return;
            }
            self.pos += 2;
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Tag;

    fn next(&mut self) -> Option<Tag> {
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] != b'<' {
                self.pos += 1;
                continue;
            }

            if self.at(self.pos + 1) == Some(b'!') {
                self.pos += 2;
                self.skip_declaration();
                continue;
            }

            self.pos += 1;
            if !self.at(self.pos).is_some_and(|b| b.is_ascii_alphabetic()) {
                continue;
            }

            let start = self.pos;
            while self.at(self.pos).is_some_and(|b| b.is_ascii_alphanumeric()) {
                self.pos += 1;
            }
            let name = self.html[start..self.pos].to_ascii_lowercase();
            let attributes = self.attributes();

            if name == "script" || name == "style" {
                self.skip_raw_text(&name);
            } else if self.pos < self.bytes.len() {
                // past the closing '>'
                self.pos += 1;
            }

            return Some(Tag { name, attributes });
        }

        None
    }
}

/// Attribute names run until whitespace, `/`, `>`, a quote or `=`.
fn is_attribute_name_byte(b: u8) -> bool {
    !matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' ' | b'/' | b'>' | b'"' | b'\'' | b'=')
}
