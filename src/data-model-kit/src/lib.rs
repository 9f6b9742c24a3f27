pub mod models;
pub mod prerendered;

// Make test_helpers available for tests in this crate and dependent crates
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use models::{
    EntryMismatchDetails, HttpErrorDetails, MissingIdDetails, PrerenderOption, ReferenceType, RenderRequest,
    RenderResponse,
};
pub use prerendered::{Asset, Page, PrerenderedSet, Redirect, etag};
