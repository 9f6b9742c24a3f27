//! Resolving discovered references relative to the document they were found in.

use std::sync::LazyLock;

use url::Url;

/// Stand-in origin for site-relative resolution. A result still on this scheme was
/// internal, and is reported as a root-relative path.
static INTERNAL: LazyLock<Url> =
    LazyLock::new(|| Url::parse("prerender-internal://internal/").expect("internal base url is valid"));

/// Resolves `href` against `base` (a root-relative path).
///
/// Protocol-relative and absolute URLs stay absolute; everything else becomes a
/// root-relative path with its query and fragment. `None` when the reference can't be
/// parsed as a URL.
pub fn resolve(base: &str, href: &str) -> Option<String> {
    if href.starts_with("//") {
        return Some(href.to_string());
    }

    let base = INTERNAL.join(base).ok()?;
    let url = base.join(href).ok()?;
    if url.scheme() != INTERNAL.scheme() {
        return Some(url.to_string());
    }

    let mut resolved = url.path().to_string();
    if let Some(query) = url.query().filter(|query| !query.is_empty()) {
        resolved.push('?');
        resolved.push_str(query);
    }
    if let Some(fragment) = url.fragment().filter(|fragment| !fragment.is_empty()) {
        resolved.push('#');
        resolved.push_str(fragment);
    }
    Some(resolved)
}

/// A path on this site: starts with `/` but isn't protocol-relative.
pub fn is_root_relative(href: &str) -> bool {
    href.starts_with('/') && !href.starts_with("//")
}
