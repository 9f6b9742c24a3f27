//! Test utilities for building renderer responses
//!
//! These helpers keep orchestrator tests focused on site structure rather than on
//! assembling headers and bodies by hand.

use crate::models::RenderResponse;

// =============================================================================
// Pages
// =============================================================================

/// A 200 `text/html` page with the given body.
pub fn html(body: &str) -> RenderResponse {
    RenderResponse::new(200)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_body(body)
}

/// A 200 HTML page rendered by `route_id`, wrapped in a minimal document.
pub fn page(route_id: &str, body: &str) -> RenderResponse {
    html(&format!("<!doctype html><html><head></head><body>{body}</body></html>")).with_route_id(route_id)
}

/// A page that links to each of `hrefs`.
pub fn page_linking_to(route_id: &str, hrefs: &[&str]) -> RenderResponse {
    let links: String = hrefs.iter().map(|href| format!("<a href=\"{href}\">{href}</a>")).collect();
    page(route_id, &links)
}

// =============================================================================
// Other responses
// =============================================================================

/// A 200 `application/json` response.
pub fn json(body: &str) -> RenderResponse {
    RenderResponse::new(200)
        .with_header("content-type", "application/json")
        .with_body(body)
}

pub fn redirect(status: u16, location: &str) -> RenderResponse {
    RenderResponse::new(status).with_header("location", location)
}

pub fn not_found() -> RenderResponse {
    RenderResponse::new(404)
        .with_header("content-type", "text/html")
        .with_body("Not found")
}
