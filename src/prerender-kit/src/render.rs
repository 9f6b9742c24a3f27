//! The contract between the orchestrator and the application being prerendered.

use async_trait::async_trait;
use core_kit::Params;
use data_model_kit::{PrerenderOption, RenderRequest, RenderResponse};
use serde::Deserialize;

/// Renders one request of the built application.
///
/// Implementations are foreign code; any failure is reported as an [`anyhow::Error`] and
/// ends the run.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Renders `request`. `assets` reads back files already produced by this run, so a page
    /// can fetch a sibling without a network round trip.
    async fn render(&self, request: RenderRequest, assets: &dyn AssetReader) -> anyhow::Result<RenderResponse>;
}

/// Read access to files the renderer may need while rendering.
#[async_trait]
pub trait AssetReader: Send + Sync {
    /// The contents served at `path` (decoded, including any paths base), or `None` if
    /// nothing was written there yet and no static file exists.
    async fn read(&self, path: &str) -> Option<Vec<u8>>;
}

/// A route of the application as known at build time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteEntry {
    pub id: String,
    pub prerender: PrerenderOption,
    /// Parameter sets produced by the route's entry generator. Each is resolved into a
    /// path and crawled.
    #[serde(default)]
    pub entries: Vec<Params>,
}

impl RouteEntry {
    pub fn new(id: impl Into<String>, prerender: PrerenderOption) -> Self {
        RouteEntry {
            id: id.into(),
            prerender,
            entries: Vec::new(),
        }
    }

    pub fn with_entry<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.entries
            .push(params.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// `true` and `auto` routes are crawled; `false` routes never are seeded.
    pub fn is_prerenderable(&self) -> bool {
        self.prerender != PrerenderOption::False
    }

    /// The path this route is served at when it can be prerendered without parameters:
    /// optional parameters are dropped, anything else dynamic yields `None`.
    pub fn static_path(&self) -> Option<String> {
        let mut id = self.id.clone();
        loop {
            let stripped = core_kit::remove_optional_params(&id);
            if stripped == id {
                break;
            }
            id = stripped;
        }

        let segments: Vec<&str> = core_kit::routing::route_segments(&id).collect();
        if segments.iter().any(|segment| core_kit::has_params(segment)) {
            return None;
        }
        Some(format!("/{}", segments.join("/")))
    }
}
