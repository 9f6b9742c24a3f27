use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// PrerenderOption enum
/// Whether a route must, may or must not be prerendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrerenderOption {
    /// The route must be prerendered; failing to reach it fails the run
    True,
    /// Prerendered if reached, otherwise served dynamically
    Auto,
    /// Never prerendered
    False,
}

// ReferenceType enum
/// How a path was discovered during a crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    /// Found via a link in a rendered page
    Linked,
    /// Fetched by the renderer while rendering another page
    Fetched,
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linked => write!(f, "linked"),
            Self::Fetched => write!(f, "fetched"),
        }
    }
}

/// A request handed to the renderer: one GET of a page on the synthetic origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Scheme and host the request claims to be for, e.g. `http://prerender.local`.
    #[serde(default)]
    pub origin: String,
    /// Decoded pathname, including any paths base.
    pub path: String,
    /// Query string without the leading `?`. Empty when there is none.
    #[serde(default)]
    pub query: String,
    pub method: String,
    /// Lowercase header names.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl RenderRequest {
    pub fn get(path: impl Into<String>) -> Self {
        RenderRequest {
            origin: String::new(),
            path: path.into(),
            query: String::new(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// The full URL of this request.
    pub fn url(&self) -> String {
        let origin = self.origin.trim_end_matches('/');
        if self.query.is_empty() {
            format!("{origin}{}", self.path)
        } else {
            format!("{origin}{}?{}", self.path, self.query)
        }
    }
}

/// What the renderer produced for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResponse {
    pub status: u16,
    /// Lowercase header names.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Vec<u8>,
    /// The route id that handled the request, when it was a route rather than an asset.
    #[serde(default)]
    pub route_id: Option<String>,
    /// The route's prerender option, when the route declared one.
    #[serde(default)]
    pub prerender: Option<PrerenderOption>,
    /// A redirect the renderer issued only to normalize the trailing slash.
    #[serde(default)]
    pub normalized: bool,
    /// Responses to internal fetches made while rendering, keyed by decoded path.
    #[serde(default)]
    pub dependencies: BTreeMap<String, RenderResponse>,
}

impl RenderResponse {
    pub fn new(status: u16) -> Self {
        RenderResponse {
            status,
            headers: BTreeMap::new(),
            body: Vec::new(),
            route_id: None,
            prerender: None,
            normalized: false,
            dependencies: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_route_id(mut self, route_id: impl Into<String>) -> Self {
        self.route_id = Some(route_id.into());
        self
    }

    pub fn with_prerender(mut self, prerender: PrerenderOption) -> Self {
        self.prerender = Some(prerender);
        self
    }

    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    pub fn with_dependency(mut self, path: impl Into<String>, response: RenderResponse) -> Self {
        self.dependencies.insert(path.into(), response);
        self
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// The media type, without parameters such as `charset`.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(|value| value.split(';').next().unwrap_or(value).trim())
    }

    pub fn is_html(&self) -> bool {
        self.content_type() == Some("text/html")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Passed to the `handleHttpError` policy for a response that is neither 2xx nor 3xx.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpErrorDetails {
    pub status: u16,
    pub path: String,
    /// The page that linked to or fetched `path`. `None` for entries.
    pub referrer: Option<String>,
    pub reference_type: ReferenceType,
}

impl fmt::Display for HttpErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.path)?;
        if let Some(referrer) = &self.referrer {
            write!(f, " ({} from {})", self.reference_type, referrer)?;
        }
        Ok(())
    }
}

/// Passed to the `handleMissingId` policy for a `path#id` link whose target page has no such id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingIdDetails {
    pub path: String,
    pub id: String,
    /// Pages linking to `path#id`.
    pub referrers: Vec<String>,
}

impl fmt::Display for MissingIdDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The following pages contain links to {}#{}, but no element with id=\"{}\" exists on {}:",
            self.path, self.id, self.id, self.path
        )?;
        for referrer in &self.referrers {
            write!(f, "\n  - {referrer}")?;
        }
        Ok(())
    }
}

/// Passed to the `handleEntryGeneratorMismatch` policy when an entry generated for one route
/// is handled by another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryMismatchDetails {
    pub generated_from_id: String,
    pub entry: String,
    pub matched_id: String,
}

impl fmt::Display for EntryMismatchDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The entries generated for {} include {}, which was matched by {}",
            self.generated_from_id, self.entry, self.matched_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_headers_are_case_insensitive() {
        let response = RenderResponse::new(200).with_header("Content-Type", "text/html; charset=utf-8");
        assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("text/html; charset=utf-8"));
        assert_eq!(response.content_type(), Some("text/html"));
        assert!(response.is_html());
    }

    #[test]
    fn test_response_status_classes() {
        assert!(RenderResponse::new(204).is_success());
        assert!(!RenderResponse::new(204).is_redirect());
        let redirect = RenderResponse::new(301).with_header("location", "/c");
        assert!(redirect.is_redirect());
        assert_eq!(redirect.location(), Some("/c"));
        assert!(!RenderResponse::new(404).is_success());
        assert!(!RenderResponse::new(404).is_redirect());
    }

    #[test]
    fn test_request_url() {
        let request = RenderRequest::get("/blog/post").with_origin("http://prerender.local/");
        assert_eq!(request.method, "GET");
        assert_eq!(request.url(), "http://prerender.local/blog/post");
        let request = request.with_origin("http://prerender.local").with_query("page=2");
        assert_eq!(request.url(), "http://prerender.local/blog/post?page=2");
    }

    #[test]
    fn test_prerender_option_serde() {
        assert_eq!(serde_json::to_string(&PrerenderOption::Auto).unwrap(), "\"auto\"");
        let parsed: PrerenderOption = serde_json::from_str("\"true\"").unwrap();
        assert_eq!(parsed, PrerenderOption::True);
    }

    #[test]
    fn test_response_deserializes_with_defaults() {
        let response: RenderResponse = serde_json::from_str(r#"{"status": 404}"#).unwrap();
        assert_eq!(response, RenderResponse::new(404));
    }

    #[test]
    fn test_details_messages() {
        let details = HttpErrorDetails {
            status: 404,
            path: "/missing".to_string(),
            referrer: Some("/".to_string()),
            reference_type: ReferenceType::Linked,
        };
        assert_eq!(details.to_string(), "404 /missing (linked from /)");

        let details = HttpErrorDetails {
            referrer: None,
            ..details
        };
        assert_eq!(details.to_string(), "404 /missing");

        let details = MissingIdDetails {
            path: "/docs".to_string(),
            id: "intro".to_string(),
            referrers: vec!["/".to_string(), "/about".to_string()],
        };
        assert!(details.to_string().contains("links to /docs#intro"));
        assert!(details.to_string().ends_with("\n  - /\n  - /about"));
    }
}
