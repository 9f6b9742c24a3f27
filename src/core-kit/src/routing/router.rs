//! Resolves request pathnames to route ids: compiled routes are tried most-specific-first
//! and the first one whose matchers accept the captured values wins.

use std::fmt;

use serde::Serialize;

use crate::errors::{Error, Result};
use crate::routing::{
    CompiledRoute, Matchers, Params, RouteSorter, compile, decode_params, decode_pathname, exec,
};

/// The route that handles a pathname, with its decoded parameter values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteMatch {
    pub id: String,
    pub params: Params,
}

pub struct Router {
    routes: Vec<CompiledRoute>,
    matchers: Matchers,
}

impl Router {
    /// Compiles and orders `ids`. Fails on malformed ids and on ids that reference a matcher
    /// missing from `matchers`.
    pub fn new<I, S>(ids: I, matchers: Matchers) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut routes = ids
            .into_iter()
            .map(|id| compile(id.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        for route in &routes {
            let unknown = route
                .params
                .iter()
                .filter_map(|param| param.matcher.as_deref())
                .find(|matcher| !matchers.contains_key(*matcher));
            if let Some(matcher) = unknown {
                return Err(Error::UnknownMatcher {
                    id: route.id.clone(),
                    matcher: matcher.to_string(),
                });
            }
        }

        RouteSorter::new().sort_by_id(&mut routes, |route| route.id.as_str());
        tracing::debug!("Router built with {} routes", routes.len());

        Ok(Router { routes, matchers })
    }

    /// Routes in the order they are tried.
    pub fn routes(&self) -> impl Iterator<Item = &CompiledRoute> {
        self.routes.iter()
    }

    /// Finds the route handling `pathname`. `Ok(None)` means no route applies.
    pub fn find(&self, pathname: &str) -> Result<Option<RouteMatch>> {
        let decoded = decode_pathname(pathname)?;

        for route in &self.routes {
            let Some(values) = route.captures(&decoded) else {
                continue;
            };
            let Some(params) = exec(&values, &route.params, &self.matchers) else {
                continue;
            };
            return Ok(Some(RouteMatch {
                id: route.id.clone(),
                params: decode_params(params)?,
            }));
        }

        Ok(None)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.routes.iter().map(|route| route.id.as_str()).collect();
        let mut matchers: Vec<&str> = self.matchers.keys().map(String::as_str).collect();
        matchers.sort_unstable();
        f.debug_struct("Router")
            .field("routes", &ids)
            .field("matchers", &matchers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::routing::resolve_route;

    fn matchers() -> Matchers {
        let mut matchers = Matchers::new();
        matchers.insert(
            "integer".to_string(),
            Arc::new(|value: &str| !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())),
        );
        matchers
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn found(router: &Router, pathname: &str) -> Option<(String, Params)> {
        router.find(pathname).unwrap().map(|m| (m.id, m.params))
    }

    #[test]
    fn test_find_prefers_most_specific() {
        let router = Router::new(["/[...rest]", "/blog/[slug]", "/blog/latest"], Matchers::new()).unwrap();

        assert_eq!(found(&router, "/blog/latest"), Some(("/blog/latest".to_string(), Params::new())));
        assert_eq!(
            found(&router, "/blog/hello"),
            Some(("/blog/[slug]".to_string(), params(&[("slug", "hello")])))
        );
        assert_eq!(
            found(&router, "/x/y"),
            Some(("/[...rest]".to_string(), params(&[("rest", "x/y")])))
        );
    }

    #[test]
    fn test_find_falls_through_rejecting_matcher() {
        let router = Router::new(["/[slug]", "/[id=integer]"], matchers()).unwrap();
        assert_eq!(found(&router, "/42").unwrap().0, "/[id=integer]");
        assert_eq!(found(&router, "/abc").unwrap().0, "/[slug]");
    }

    #[test]
    fn test_find_none() {
        let router = Router::new(["/about"], Matchers::new()).unwrap();
        assert_eq!(found(&router, "/contact"), None);
    }

    #[test]
    fn test_find_decodes_pathname_and_params() {
        let router = Router::new(["/blog/[slug]"], Matchers::new()).unwrap();
        assert_eq!(
            found(&router, "/blog/hello%20world"),
            Some(("/blog/[slug]".to_string(), params(&[("slug", "hello world")])))
        );
        // an encoded slash stays inside one segment, then decodes in the param
        assert_eq!(
            found(&router, "/blog/a%2Fb"),
            Some(("/blog/[slug]".to_string(), params(&[("slug", "a/b")])))
        );
    }

    #[test]
    fn test_rest_params_match_encoded_newlines() {
        let router = Router::new(["/[...rest]", "/docs/[...path]"], Matchers::new()).unwrap();
        assert_eq!(
            found(&router, "/docs/a%0Ab"),
            Some(("/docs/[...path]".to_string(), params(&[("path", "a\nb")])))
        );
        assert_eq!(
            found(&router, "/x%0Ay/z"),
            Some(("/[...rest]".to_string(), params(&[("rest", "x\ny/z")])))
        );
    }

    #[test]
    fn test_find_escaped_route_characters() {
        let router = Router::new(["/foo[x+2f]bar"], Matchers::new()).unwrap();
        assert!(found(&router, "/foo%2Fbar").is_some());
        assert!(found(&router, "/foo/bar").is_none());
    }

    #[test]
    fn test_new_rejects_unknown_matcher() {
        let err = Router::new(["/[id=nope]"], matchers()).unwrap_err();
        assert!(matches!(err, Error::UnknownMatcher { ref matcher, .. } if matcher == "nope"));
    }

    #[test]
    fn test_new_rejects_invalid_route() {
        assert!(matches!(
            Router::new(["/[a"], Matchers::new()),
            Err(Error::InvalidRoute { .. })
        ));
    }

    #[test]
    fn test_resolve_then_match_round_trips() {
        let cases = [
            ("/blog/[slug]", params(&[("slug", "hello")])),
            ("/docs/[...path]", params(&[("path", "a/b/c")])),
            ("/docs/[...path]", params(&[("path", "")])),
            ("/[[lang]]/about", params(&[("lang", "en")])),
            ("/[[lang]]/about", Params::new()),
            ("/files/[name].[ext]", params(&[("name", "report"), ("ext", "pdf")])),
            ("/(marketing)/shop/[category]/[item]", params(&[("category", "hats"), ("item", "fez")])),
        ];

        for (id, expected) in cases {
            let router = Router::new([id], Matchers::new()).unwrap();
            let path = resolve_route(id, &expected).unwrap();
            let matched = router.find(&path).unwrap().unwrap_or_else(|| panic!("{path} should match {id}"));
            assert_eq!(matched.params, expected, "round trip through {path}");
        }
    }
}
