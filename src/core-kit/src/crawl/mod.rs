//! Link discovery in rendered HTML without building a DOM.

use serde::Serialize;

mod entities;
mod links;
mod tokenizer;

pub use entities::decode_entities;
pub use links::{is_root_relative, resolve};
pub use tokenizer::crawl;

/// What one document exposes to the crawler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlResult {
    /// Element ids, plus `name` on anchors: valid `#fragment` targets within the document.
    pub ids: Vec<String>,
    /// Link, asset and social-preview references, resolved against the document's base.
    pub hrefs: Vec<String>,
}
