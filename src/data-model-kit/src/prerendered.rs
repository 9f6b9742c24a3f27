//! The summary of one prerender run: what was written where, in the order it happened.

use std::collections::{BTreeSet, HashMap};

use serde::ser::{Serialize, SerializeMap, Serializer};

/// The ETag for a body: the quoted md5 hex digest.
pub fn etag(body: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(body))
}

/// A rendered page, written to `file` (relative to the pages output directory).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Page {
    pub file: String,
    pub etag: String,
}

/// A non-HTML response saved as a file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Asset {
    #[serde(rename = "type")]
    pub content_type: String,
    pub etag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Redirect {
    pub status: u16,
    pub location: String,
}

/// Path-keyed entries kept in insertion order.
#[derive(Debug, Clone)]
struct Ordered<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for Ordered<V> {
    fn default() -> Self {
        Ordered {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> Ordered<V> {
    fn get(&self, path: &str) -> Option<&V> {
        self.index.get(path).map(|&i| &self.entries[i].1)
    }

    fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    fn insert(&mut self, path: String, value: V) {
        self.index.insert(path.clone(), self.entries.len());
        self.entries.push((path, value));
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(path, value)| (path.as_str(), value))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<V: Serialize> Serialize for Ordered<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (path, value) in &self.entries {
            map.serialize_entry(path, value)?;
        }
        map.end()
    }
}

/// Every path saved by a run. A path is recorded at most once, as exactly one of a page,
/// an asset or a redirect; `paths` lists them all in the order they were saved.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PrerenderedSet {
    pages: Ordered<Page>,
    assets: Ordered<Asset>,
    redirects: Ordered<Redirect>,
    paths: Vec<String>,
    /// Route ids that produced at least one prerendered response.
    prerendered_routes: BTreeSet<String>,
}

impl PrerenderedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `path` was already recorded in any form.
    pub fn contains(&self, path: &str) -> bool {
        self.pages.contains(path) || self.assets.contains(path) || self.redirects.contains(path)
    }

    /// Records a page. Returns `false` (and records nothing) if the path is already known.
    pub fn add_page(&mut self, path: &str, page: Page) -> bool {
        if self.contains(path) {
            return false;
        }
        self.pages.insert(path.to_string(), page);
        self.paths.push(path.to_string());
        true
    }

    /// Records an asset. Returns `false` (and records nothing) if the path is already known.
    pub fn add_asset(&mut self, path: &str, asset: Asset) -> bool {
        if self.contains(path) {
            return false;
        }
        self.assets.insert(path.to_string(), asset);
        self.paths.push(path.to_string());
        true
    }

    /// Records a redirect. Returns `false` (and records nothing) if the path is already known.
    pub fn add_redirect(&mut self, path: &str, redirect: Redirect) -> bool {
        if self.contains(path) {
            return false;
        }
        self.redirects.insert(path.to_string(), redirect);
        self.paths.push(path.to_string());
        true
    }

    pub fn add_prerendered_route(&mut self, route_id: &str) {
        if !self.prerendered_routes.contains(route_id) {
            self.prerendered_routes.insert(route_id.to_string());
        }
    }

    pub fn page(&self, path: &str) -> Option<&Page> {
        self.pages.get(path)
    }

    pub fn asset(&self, path: &str) -> Option<&Asset> {
        self.assets.get(path)
    }

    pub fn redirect(&self, path: &str) -> Option<&Redirect> {
        self.redirects.get(path)
    }

    pub fn pages(&self) -> impl Iterator<Item = (&str, &Page)> {
        self.pages.iter()
    }

    pub fn assets(&self) -> impl Iterator<Item = (&str, &Asset)> {
        self.assets.iter()
    }

    pub fn redirects(&self) -> impl Iterator<Item = (&str, &Redirect)> {
        self.redirects.iter()
    }

    /// All recorded paths, in the order they were saved.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn prerendered_routes(&self) -> impl Iterator<Item = &str> {
        self.prerendered_routes.iter().map(String::as_str)
    }

    pub fn is_route_prerendered(&self, route_id: &str) -> bool {
        self.prerendered_routes.contains(route_id)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn redirect_count(&self) -> usize {
        self.redirects.len()
    }
}
