//! Specificity ordering of route ids: the most specific route is tried first when matching.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::routing::parse::route_segments;

/// Matches the remainder of an id after an `[[optional]]` group when that group is last
/// (only route groups may follow it).
static TRAILING_GROUPS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:/\([^/]+\))*$").expect("trailing groups pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartKind {
    Static,
    Required,
    Optional,
    Rest,
}

/// One piece of a segment: segments alternate static and dynamic parts, starting and
/// ending with a (possibly empty) static part.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    kind: PartKind,
    content: String,
    /// The parameter names a matcher (`[id=integer]`).
    matched: bool,
}

/// Orders routes most-specific-first. Owns the cache of parsed segments so repeated
/// comparisons of the same ids don't re-split them.
#[derive(Debug, Default)]
pub struct RouteSorter {
    segments_by_id: HashMap<String, Vec<String>>,
    parts_by_segment: HashMap<String, Vec<Part>>,
}

impl RouteSorter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorts `items` in place by the specificity of the route id each one carries.
    pub fn sort_by_id<T, F>(&mut self, items: &mut [T], id_of: F)
    where
        F: Fn(&T) -> &str,
    {
        for item in items.iter() {
            self.prepare(id_of(item));
        }
        let sorter = &*self;
        items.sort_by(|a, b| sorter.compare(id_of(a), id_of(b)));
    }

    /// Sorts route ids in place.
    pub fn sort_ids<S: AsRef<str>>(&mut self, ids: &mut [S]) {
        self.sort_by_id(ids, |id| id.as_ref());
    }

    fn prepare(&mut self, id: &str) {
        if self.segments_by_id.contains_key(id) {
            return;
        }
        let segments = sorting_segments(id);
        for segment in &segments {
            if !self.parts_by_segment.contains_key(segment) {
                self.parts_by_segment.insert(segment.clone(), split(segment));
            }
        }
        self.segments_by_id.insert(id.to_string(), segments);
    }

    fn parts_of(&self, id: &str) -> Vec<&[Part]> {
        self.segments_by_id
            .get(id)
            .map(|segments| {
                segments
                    .iter()
                    .filter_map(|segment| self.parts_by_segment.get(segment).map(Vec::as_slice))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Compares two prepared ids. `Less` means `a` is more specific and is tried first.
    fn compare(&self, id_a: &str, id_b: &str) -> Ordering {
        let segments_a = self.parts_of(id_a);
        let segments_b = self.parts_of(id_b);

        for i in 0..segments_a.len().max(segments_b.len()) {
            let missing_a = i >= segments_a.len();
            let missing_b = i >= segments_b.len();
            let segment_a = segments_a.get(i).copied().unwrap_or(EMPTY_SEGMENT);
            let segment_b = segments_b.get(i).copied().unwrap_or(EMPTY_SEGMENT);

            for j in 0..segment_a.len().max(segment_b.len()) {
                let a = segment_a.get(j);
                let b = segment_b.get(j);

                if j % 2 == 1 {
                    // an absent parameter slot is the more static of the two
                    let Some(a) = a else { return Ordering::Less };
                    let Some(b) = b else { return Ordering::Greater };

                    let next_a = next_static(&segments_a, i, segment_a, j);
                    let next_b = next_static(&segments_b, i, segment_b, j);

                    if a.kind == PartKind::Rest && b.kind == PartKind::Rest {
                        // `[...rest]/x` outranks `[...rest]`
                        match (next_a, next_b) {
                            (true, true) => continue,
                            (true, false) => return Ordering::Less,
                            (false, true) => return Ordering::Greater,
                            (false, false) => {
                                if a.matched != b.matched {
                                    return if a.matched { Ordering::Less } else { Ordering::Greater };
                                }
                                continue;
                            }
                        }
                    }

                    // `[...rest]/x` outranks `[required]` or `[required]/[required]`, but not `[required]/x`
                    if a.kind == PartKind::Rest {
                        return if next_a && !next_b { Ordering::Less } else { Ordering::Greater };
                    }
                    if b.kind == PartKind::Rest {
                        return if next_b && !next_a { Ordering::Greater } else { Ordering::Less };
                    }

                    if a.matched != b.matched {
                        return if a.matched { Ordering::Less } else { Ordering::Greater };
                    }

                    if a.kind != b.kind {
                        if a.kind == PartKind::Required {
                            return Ordering::Less;
                        }
                        if b.kind == PartKind::Required {
                            return Ordering::Greater;
                        }
                    }
                } else {
                    let content_a = a.map(|part| part.content.as_str());
                    let content_b = b.map(|part| part.content.as_str());
                    if content_a == content_b {
                        continue;
                    }

                    // shallower path outranks deeper path
                    if missing_a && j == 0 {
                        return Ordering::Less;
                    }
                    if missing_b && j == 0 {
                        return Ordering::Greater;
                    }

                    return sort_static(content_a.unwrap_or_default(), content_b.unwrap_or_default());
                }
            }
        }

        // reverse lexicographic order of the raw ids, for full determinism
        id_b.cmp(id_a)
    }
}

/// Sorts route ids with a fresh sorter.
pub fn sort_routes<S: AsRef<str>>(ids: &mut [S]) {
    RouteSorter::new().sort_ids(ids);
}

const EMPTY_PART: Part = Part {
    kind: PartKind::Static,
    content: String::new(),
    matched: false,
};

/// Stand-in for a segment one id has and the other lacks.
static EMPTY_SEGMENT: &[Part] = &[EMPTY_PART];

/// Whether a static chunk follows the dynamic part at `j`: either the rest of this segment
/// or the start of the next one.
fn next_static(segments: &[&[Part]], i: usize, segment: &[Part], j: usize) -> bool {
    let within = segment.get(j + 1).map(|part| part.content.as_str()).unwrap_or_default();
    if !within.is_empty() {
        return true;
    }
    segments
        .get(i + 1)
        .and_then(|next| next.first())
        .is_some_and(|part| !part.content.is_empty())
}

/// Route segments relevant to ordering: `[[optional]]` groups are dropped unless they
/// end the id, since a mid-path optional that's absent is invisible when matching.
fn sorting_segments(id: &str) -> Vec<String> {
    let mut stripped = String::with_capacity(id.len());
    let mut rest = id;
    while let Some(start) = rest.find("[[") {
        let Some(len) = rest[start..].find("]]") else { break };
        let end = start + len + 2;
        stripped.push_str(&rest[..start]);
        if TRAILING_GROUPS.is_match(&rest[end..]) {
            stripped.push_str(&rest[start..end]);
        }
        rest = &rest[end..];
    }
    stripped.push_str(rest);

    route_segments(&stripped).map(str::to_string).collect()
}

fn split(segment: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut i = 0;

    loop {
        let Some(offset) = segment[i..].find('[') else {
            parts.push(Part {
                kind: PartKind::Static,
                content: segment[i..].to_string(),
                matched: false,
            });
            break;
        };
        let start = i + offset;
        parts.push(Part {
            kind: PartKind::Static,
            content: segment[i..start].to_string(),
            matched: false,
        });

        let (kind, delimiter) = match segment.as_bytes().get(start + 1) {
            Some(b'[') => (PartKind::Optional, "]]"),
            Some(b'.') => (PartKind::Rest, "]"),
            _ => (PartKind::Required, "]"),
        };
        // ids are validated before they're sorted; an unterminated bracket is kept as static text
        let Some(len) = segment[start..].find(delimiter) else {
            if let Some(last) = parts.last_mut() {
                last.content.push_str(&segment[start..]);
            }
            break;
        };
        i = start + len + delimiter.len();

        let content = &segment[start..i];
        parts.push(Part {
            kind,
            content: content.to_string(),
            matched: content.contains('='),
        });
    }

    parts
}

/// Lexicographic order, except that a string outranks any strict prefix of itself.
fn sort_static(a: &str, b: &str) -> Ordering {
    let mut chars_a = a.chars();
    let mut chars_b = b.chars();
    loop {
        match (chars_a.next(), chars_b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Greater,
            (Some(_), None) => return Ordering::Less,
            (Some(x), Some(y)) if x != y => return x.cmp(&y),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(ids: &[&str]) -> Vec<String> {
        let mut ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        sort_routes(&mut ids);
        ids
    }

    #[test]
    fn test_static_outranks_dynamic() {
        assert_eq!(sorted(&["/foo/[bar]", "/foo/baz"]), vec!["/foo/baz", "/foo/[bar]"]);
    }

    #[test]
    fn test_rest_with_suffix_outranks_bare_rest() {
        assert_eq!(sorted(&["/[...rest]", "/[...rest]/x"]), vec!["/[...rest]/x", "/[...rest]"]);
    }

    #[test]
    fn test_matcher_outranks_plain() {
        assert_eq!(sorted(&["/[a]", "/[b=integer]"]), vec!["/[b=integer]", "/[a]"]);
    }

    #[test]
    fn test_required_outranks_optional() {
        assert_eq!(sorted(&["/x/[[a]]", "/x/[b]"]), vec!["/x/[b]", "/x/[[a]]"]);
    }

    #[test]
    fn test_rest_loses_to_required() {
        assert_eq!(sorted(&["/[...rest]", "/[slug]"]), vec!["/[slug]", "/[...rest]"]);
        assert_eq!(sorted(&["/[slug]/x", "/[...rest]/x"]), vec!["/[slug]/x", "/[...rest]/x"]);
        assert_eq!(sorted(&["/[a]/[b]", "/[...rest]/x"]), vec!["/[...rest]/x", "/[a]/[b]"]);
    }

    #[test]
    fn test_longer_static_outranks_prefix() {
        assert_eq!(sort_static("foobar", "foo"), Ordering::Less);
        assert_eq!(sort_static("foo", "foobar"), Ordering::Greater);
        assert_eq!(sort_static("abc", "abd"), Ordering::Less);
        assert_eq!(sorted(&["/foo", "/foobar"]), vec!["/foobar", "/foo"]);
    }

    #[test]
    fn test_shallower_outranks_deeper() {
        assert_eq!(sorted(&["/a/b", "/a"]), vec!["/a", "/a/b"]);
        assert_eq!(sorted(&["/a/[b]", "/a"]), vec!["/a", "/a/[b]"]);
    }

    #[test]
    fn test_mid_path_optional_is_ignored() {
        // `/[[lang]]/about` compares like `/about`
        assert_eq!(sorted(&["/[slug]", "/[[lang]]/about"]), vec!["/[[lang]]/about", "/[slug]"]);
    }

    #[test]
    fn test_tie_break_is_reverse_lexicographic() {
        assert_eq!(sorted(&["/(a)/x", "/(b)/x"]), vec!["/(b)/x", "/(a)/x"]);
    }

    #[test]
    fn test_sort_is_independent_of_input_order() {
        let ids = [
            "/",
            "/about",
            "/blog",
            "/blog/[slug]",
            "/blog/[slug=word]",
            "/blog/latest",
            "/blog/[...rest]",
            "/[[lang]]",
            "/[lang=locale]/about",
            "/[...catchall]",
            "/[...catchall]/edit",
            "/file-[id].json",
        ];
        let expected = sorted(&ids);
        assert_eq!(
            expected,
            vec![
                "/",
                "/about",
                "/blog",
                "/blog/latest",
                "/blog/[slug=word]",
                "/blog/[slug]",
                "/blog/[...rest]",
                "/file-[id].json",
                "/[lang=locale]/about",
                "/[...catchall]/edit",
                "/[[lang]]",
                "/[...catchall]",
            ]
        );

        let mut reversed = ids.to_vec();
        reversed.reverse();
        assert_eq!(sorted(&reversed), expected);

        for shift in 1..ids.len() {
            let mut rotated = ids.to_vec();
            rotated.rotate_left(shift);
            assert_eq!(sorted(&rotated), expected, "rotation by {shift}");
        }
    }

    #[test]
    fn test_sort_by_id_with_cache_reuse() {
        #[derive(Debug, PartialEq)]
        struct Route(&'static str);

        let mut sorter = RouteSorter::new();
        let mut routes = vec![Route("/[a]"), Route("/a")];
        sorter.sort_by_id(&mut routes, |route| route.0);
        assert_eq!(routes, vec![Route("/a"), Route("/[a]")]);

        let mut again = vec![Route("/a"), Route("/[a]"), Route("/b")];
        sorter.sort_by_id(&mut again, |route| route.0);
        assert_eq!(again, vec![Route("/a"), Route("/b"), Route("/[a]")]);
    }

    #[test]
    fn test_split() {
        let parts = split("x-[a=m]-[[b]].[...c]");
        let kinds: Vec<PartKind> = parts.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PartKind::Static,
                PartKind::Required,
                PartKind::Static,
                PartKind::Optional,
                PartKind::Static,
                PartKind::Rest,
                PartKind::Static,
            ]
        );
        assert!(parts[1].matched);
        assert_eq!(parts[3].content, "[[b]]");
    }
}
