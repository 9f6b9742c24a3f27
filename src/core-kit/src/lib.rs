//! Functional core of the prerender toolkit: route ids (compile, match, order), link
//! discovery in rendered HTML, and a bounded task queue.

pub mod common;
pub mod crawl;
pub mod errors;
pub mod queue;
pub mod routing;

pub use common::{MaxConcurrencyError, max_concurrency, parse_concurrency, setup_logging};
pub use crawl::{CrawlResult, crawl, is_root_relative, resolve};
pub use errors::{Error, Result};
pub use queue::{Pending, QueueError, TaskQueue};
pub use routing::{
    CompiledRoute, Matchers, ParamMatcher, Params, RouteMatch, RouteParam, RouteSorter, Router, compile, exec,
    has_params, remove_optional_params, resolve_route, sort_routes,
};
