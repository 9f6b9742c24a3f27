//! Route identifier parsing: compiles `/blog/[slug]`-style ids into anchored regex patterns
//! plus ordered parameter metadata, and resolves ids back into concrete paths.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::errors::{Error, Result};
use crate::routing::Params;

/// A `[name]`, `[[name]]`, `[...name]` parameter body, optionally suffixed with `=matcher`.
static PARAM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\[)?(\.\.\.)?(\w+)(?:=(\w+))?(\])?$").expect("param pattern is valid"));

/// A whole-segment `[...rest]` parameter. Such a segment may match zero path segments.
static REST_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\.\.\.(\w+)(?:=(\w+))?\]$").expect("rest pattern is valid"));

/// A whole-segment `[[optional]]` parameter. Such a segment may match zero path segments.
static OPTIONAL_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\[(\w+)(?:=(\w+))?\]\]$").expect("optional pattern is valid"));

/// Any parameter occurrence inside a segment, used when populating an id with values.
static BASIC_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\[)?(\.\.\.)?(\w+?)(?:=(\w+))?\]\]?").expect("basic param pattern is valid"));

static OPTIONAL_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\[\[\w+?(?:=\w+)?\]\]").expect("optional param pattern is valid"));

/// Metadata for one capture group of a compiled route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteParam {
    pub name: String,
    /// Name of the param matcher that must accept the value, if any.
    pub matcher: Option<String>,
    pub optional: bool,
    pub rest: bool,
    /// Part of a contiguous optional/rest group that may span several path segments.
    pub chained: bool,
}

/// A route id compiled into a matching pattern. Built once, immutable afterwards.
///
/// `pattern` has exactly one capture group per entry in `params`, in order.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    pub id: String,
    pub pattern: Regex,
    pub params: Vec<RouteParam>,
}

impl CompiledRoute {
    /// Compiles a route id. Fails with [`Error::InvalidRoute`] on malformed ids.
    pub fn compile(id: &str) -> Result<Self> {
        validate_route_id(id)?;

        let mut params = Vec::new();
        let source = if id == "/" {
            "^/$".to_string()
        } else {
            let mut source = String::from("^");
            for segment in route_segments(id) {
                source.push_str(&compile_segment(id, segment, &mut params)?);
            }
            source.push_str("/?$");
            source
        };

        let pattern = Regex::new(&source)?;
        debug_assert_eq!(pattern.captures_len() - 1, params.len());

        Ok(CompiledRoute {
            id: id.to_string(),
            pattern,
            params,
        })
    }

    /// Tests `path` against the pattern, returning one entry per parameter.
    ///
    /// `None` entries are parameters that did not participate in the match. An optional
    /// parameter that matched the empty string is reported as absent.
    pub fn captures<'p>(&self, path: &'p str) -> Option<Vec<Option<&'p str>>> {
        let captures = self.pattern.captures(path)?;
        let values = self
            .params
            .iter()
            .enumerate()
            .map(|(i, param)| {
                captures
                    .get(i + 1)
                    .map(|m| m.as_str())
                    .filter(|value| !(param.optional && value.is_empty()))
            })
            .collect();
        Some(values)
    }
}

/// Shorthand for [`CompiledRoute::compile`].
pub fn compile(id: &str) -> Result<CompiledRoute> {
    CompiledRoute::compile(id)
}

/// Splits a route id into the segments that affect the URL: empty segments and `(group)`
/// segments are dropped.
pub fn route_segments(id: &str) -> impl Iterator<Item = &str> {
    id.strip_prefix('/')
        .unwrap_or(id)
        .split('/')
        .filter(|segment| affects_path(segment))
}

fn affects_path(segment: &str) -> bool {
    !segment.is_empty() && !is_group(segment)
}

fn is_group(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('(') && segment.ends_with(')') && !segment[1..segment.len() - 1].contains(')')
}

/// True if the id contains any parameter (or escape sequence) and therefore can't be
/// prerendered without concrete values.
pub fn has_params(id: &str) -> bool {
    id.contains('[')
}

/// Removes the first `/[[optional]]` group from an id. Call repeatedly to remove them all.
pub fn remove_optional_params(id: &str) -> String {
    OPTIONAL_PARAM.replace(id, "").into_owned()
}

/// Rejects ids whose brackets, parameter names or parameter ordering can't be compiled.
pub fn validate_route_id(id: &str) -> Result<()> {
    if !id.starts_with('/') {
        return Err(Error::invalid_route(id, "route ids must start with /"));
    }

    if id.contains('#') {
        return Err(Error::invalid_route(id, "# is not allowed in route ids"));
    }

    let segments: Vec<&str> = route_segments(id).collect();
    for segment in &segments {
        if segment.matches('[').count() != segment.matches(']').count() {
            return Err(Error::invalid_route(id, "brackets are unbalanced"));
        }
        if segment.contains("][") {
            return Err(Error::invalid_route(id, "parameters must be separated"));
        }
        let parts = split_parts(segment);
        if parts.iter().skip(1).step_by(2).any(|content| parse_dynamic(content).is_none()) {
            return Err(Error::invalid_route(
                id,
                format!("segment '{segment}' contains an invalid parameter"),
            ));
        }
    }

    for pair in segments.windows(2) {
        if REST_SEGMENT.is_match(pair[0]) && pair[1].starts_with("[[") {
            return Err(Error::invalid_route(
                id,
                "an [[optional]] route segment cannot follow a [...rest] route segment",
            ));
        }
    }

    Ok(())
}

fn compile_segment(id: &str, segment: &str, params: &mut Vec<RouteParam>) -> Result<String> {
    // these two forms may match zero path segments, so the leading slash is optional too
    if let Some(captures) = REST_SEGMENT.captures(segment) {
        params.push(RouteParam {
            name: captures[1].to_string(),
            matcher: captures.get(2).map(|m| m.as_str().to_string()),
            optional: false,
            rest: true,
            chained: true,
        });
        return Ok(r"(?:/([\s\S]*))?".to_string());
    }

    if let Some(captures) = OPTIONAL_SEGMENT.captures(segment) {
        params.push(RouteParam {
            name: captures[1].to_string(),
            matcher: captures.get(2).map(|m| m.as_str().to_string()),
            optional: true,
            rest: false,
            chained: true,
        });
        return Ok("(?:/([^/]+))?".to_string());
    }

    let parts = split_parts(segment);
    let mut source = String::from("/");
    for (i, content) in parts.iter().enumerate() {
        if i % 2 == 0 {
            source.push_str(&escape(content));
            continue;
        }

        match parse_dynamic(content) {
            Some(Dynamic::Literal(text)) => source.push_str(&escape(&text)),
            Some(Dynamic::Param(mut param)) => {
                param.chained = param.rest && i == 1 && parts[0].is_empty();
                source.push_str(if param.rest {
                    r"([\s\S]*?)"
                } else if param.optional {
                    "([^/]*)?"
                } else {
                    "([^/]+?)"
                });
                params.push(param);
            }
            None => {
                return Err(Error::invalid_route(
                    id,
                    format!("segment '{segment}' contains an invalid parameter"),
                ));
            }
        }
    }

    Ok(source)
}

enum Dynamic {
    /// `[x+HH]` or `[u+HHHH-HHHH]`: characters that can't appear literally in a filename.
    Literal(String),
    Param(RouteParam),
}

fn parse_dynamic(content: &str) -> Option<Dynamic> {
    if let Some(hex) = content.strip_prefix("x+") {
        let code = u32::from_str_radix(hex, 16).ok()?;
        return char::from_u32(code).map(|c| Dynamic::Literal(c.to_string()));
    }

    if let Some(codes) = content.strip_prefix("u+") {
        let text = codes
            .split('-')
            .map(|code| u32::from_str_radix(code, 16).ok().and_then(char::from_u32))
            .collect::<Option<String>>()?;
        return Some(Dynamic::Literal(text));
    }

    let captures = PARAM_PATTERN.captures(content)?;
    let optional = captures.get(1).is_some();
    if optional != captures.get(5).is_some() {
        return None;
    }
    Some(Dynamic::Param(RouteParam {
        name: captures[3].to_string(),
        matcher: captures.get(4).map(|m| m.as_str().to_string()),
        optional,
        rest: captures.get(2).is_some(),
        chained: false,
    }))
}

/// Splits a segment into alternating static and dynamic parts, always starting and ending
/// with a (possibly empty) static part. A dynamic part is the text between `[` and the
/// first `]` that isn't itself followed by `]`, so `[[opt]]` yields `[opt]`.
pub(crate) fn split_parts(segment: &str) -> Vec<&str> {
    let bytes = segment.as_bytes();
    let mut parts = Vec::new();
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'[' {
            i += 1;
            continue;
        }

        let close = (i + 2..bytes.len()).find(|&j| bytes[j] == b']' && bytes.get(j + 1) != Some(&b']'));
        match close {
            Some(j) => {
                parts.push(&segment[last..i]);
                parts.push(&segment[i + 1..j]);
                last = j + 1;
                i = j + 1;
            }
            None => i += 1,
        }
    }

    parts.push(&segment[last..]);
    parts
}

/// Escapes static route text for the pattern. `% / ? #` are matched in their encoded form
/// because pathname decoding leaves those escapes untouched.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2[Ff]"),
            '?' => escaped.push_str("%3[Ff]"),
            '#' => escaped.push_str("%23"),
            _ => escaped.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    escaped
}

/// Populates a route id with parameter values, producing a concrete pathname.
///
/// Missing optional parameters vanish along with their segment, as does a rest parameter
/// supplied as the empty string.
pub fn resolve_route(id: &str, params: &Params) -> Result<String> {
    let has_trailing_slash = id != "/" && id.ends_with('/');
    let mut resolved = Vec::new();

    for segment in route_segments(id) {
        let mut out = String::new();
        let mut last = 0;
        for captures in BASIC_PARAM.captures_iter(segment) {
            let Some(whole) = captures.get(0) else { continue };
            out.push_str(&segment[last..whole.start()]);
            last = whole.end();

            let optional = captures.get(1).is_some();
            let rest = captures.get(2).is_some();
            let name = &captures[3];

            match params.get(name).map(String::as_str) {
                Some("") if rest => {}
                None | Some("") if optional => {}
                None | Some("") => {
                    return Err(Error::MissingParameter {
                        id: id.to_string(),
                        name: name.to_string(),
                    });
                }
                Some(value) if value.starts_with('/') || value.ends_with('/') => {
                    return Err(Error::InvalidParameter {
                        id: id.to_string(),
                        name: name.to_string(),
                    });
                }
                Some(value) => out.push_str(value),
            }
        }
        out.push_str(&segment[last..]);

        if !out.is_empty() {
            resolved.push(out);
        }
    }

    let mut path = format!("/{}", resolved.join("/"));
    if has_trailing_slash {
        path.push('/');
    }
    Ok(path)
}
