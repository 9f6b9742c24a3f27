//! Prerendering: crawls a built application through an external [`Renderer`], writes every
//! reachable page and reports what was written.

pub mod config;
pub mod errors;
pub mod output;
pub mod prerender;
pub mod render;

// Make the mock renderer available for tests in this crate and dependent crates
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use config::{DEFAULT_ORIGIN, Policy, PrerenderOptions, PrerenderOptionsBuilder};
pub use errors::{Error, Result};
pub use output::{Category, OutputDirs, output_filename, redirect_stub};
pub use prerender::prerender;
pub use render::{AssetReader, Renderer, RouteEntry};
