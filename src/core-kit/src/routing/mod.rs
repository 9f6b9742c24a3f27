//! Route identifiers: compiling them into patterns, matching paths against them and
//! ordering them by specificity.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

mod decode;
mod exec;
mod parse;
mod router;
mod sort;

pub use decode::{decode_params, decode_pathname};
pub use exec::exec;
pub use parse::{
    CompiledRoute, RouteParam, compile, has_params, remove_optional_params, resolve_route, route_segments,
    validate_route_id,
};
pub use router::{RouteMatch, Router};
pub use sort::{RouteSorter, sort_routes};

/// Parameter name to value. Ordered so that output built from params is reproducible.
pub type Params = BTreeMap<String, String>;

/// A predicate deciding whether a captured value is acceptable for a `[name=matcher]` param.
pub type ParamMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Registered param matchers by name.
pub type Matchers = HashMap<String, ParamMatcher>;
