use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use core_kit::{Matchers, Params, QueueError, Router, TaskQueue, crawl, is_root_relative};

fn matchers() -> Matchers {
    let mut matchers = Matchers::new();
    matchers.insert(
        "integer".to_string(),
        Arc::new(|value: &str| !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())),
    );
    matchers.insert(
        "locale".to_string(),
        Arc::new(|value: &str| matches!(value, "en" | "fr" | "de")),
    );
    matchers
}

fn router() -> Router {
    Router::new(
        [
            "/",
            "/about",
            "/blog",
            "/blog/[slug]",
            "/blog/[slug]/comments/[id=integer]",
            "/docs/[...path]",
            "/[[lang=locale]]/pricing",
            "/files/[name].[ext]",
        ],
        matchers(),
    )
    .unwrap()
}

fn route(router: &Router, pathname: &str) -> Option<(String, Params)> {
    router.find(pathname).unwrap().map(|m| (m.id, m.params))
}

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn test_site_routes() {
    let router = router();

    assert_eq!(route(&router, "/"), Some(("/".to_string(), Params::new())));
    assert_eq!(route(&router, "/blog/"), Some(("/blog".to_string(), Params::new())));
    assert_eq!(
        route(&router, "/blog/hello-world"),
        Some(("/blog/[slug]".to_string(), params(&[("slug", "hello-world")])))
    );
    assert_eq!(
        route(&router, "/blog/caf%C3%A9"),
        Some(("/blog/[slug]".to_string(), params(&[("slug", "café")])))
    );
    assert_eq!(
        route(&router, "/blog/x/comments/42"),
        Some((
            "/blog/[slug]/comments/[id=integer]".to_string(),
            params(&[("slug", "x"), ("id", "42")])
        ))
    );
    assert_eq!(route(&router, "/blog/x/comments/latest"), None);
    assert_eq!(
        route(&router, "/docs"),
        Some(("/docs/[...path]".to_string(), params(&[("path", "")])))
    );
    assert_eq!(
        route(&router, "/docs/guide/intro"),
        Some(("/docs/[...path]".to_string(), params(&[("path", "guide/intro")])))
    );
    assert_eq!(
        route(&router, "/fr/pricing"),
        Some(("/[[lang=locale]]/pricing".to_string(), params(&[("lang", "fr")])))
    );
    assert_eq!(
        route(&router, "/pricing"),
        Some(("/[[lang=locale]]/pricing".to_string(), Params::new()))
    );
    assert_eq!(route(&router, "/xx/pricing"), None);
    assert_eq!(
        route(&router, "/files/report.pdf"),
        Some(("/files/[name].[ext]".to_string(), params(&[("name", "report"), ("ext", "pdf")])))
    );
}

#[test]
fn test_router_order_is_most_specific_first() {
    let ids: Vec<String> = router().routes().map(|route| route.id.clone()).collect();
    let position = |id: &str| ids.iter().position(|other| other == id).unwrap();

    assert!(position("/blog") < position("/blog/[slug]"));
    assert!(position("/blog/[slug]") < position("/blog/[slug]/comments/[id=integer]"));
    assert!(position("/about") < position("/[[lang=locale]]/pricing"));
}

#[test]
fn test_crawled_links_resolve_to_routes() {
    let html = r##"<!doctype html>
        <html>
          <head><link rel="stylesheet" href="/app.css"></head>
          <body>
            <h2 id="top">Hello</h2>
            <a href="/about">About</a>
            <a href="other#top">Other post</a>
            <a href="https://example.com/x">Elsewhere</a>
            <a href="../docs/guide/intro">Guide</a>
            <script>const fake = '<a href="/secret">';</script>
          </body>
        </html>"##;

    let result = crawl(html, "/blog/hello");
    assert_eq!(result.ids, vec!["top"]);

    let router = router();
    let routed: BTreeMap<String, Option<String>> = result
        .hrefs
        .iter()
        .filter(|href| is_root_relative(href))
        .map(|href| {
            let path = href.split('#').next().unwrap_or(href);
            (path.to_string(), router.find(path).unwrap().map(|m| m.id))
        })
        .collect();

    let expected: BTreeMap<String, Option<String>> = [
        ("/about", Some("/about")),
        ("/app.css", None),
        ("/blog/other", Some("/blog/[slug]")),
        ("/docs/guide/intro", Some("/docs/[...path]")),
    ]
    .into_iter()
    .map(|(path, id)| (path.to_string(), id.map(str::to_string)))
    .collect();
    assert_eq!(routed, expected);
}

/// A tiny crawl over an in-memory site: each page is visited once however often it is linked.
#[tokio::test]
async fn test_queue_drives_crawl_to_fixpoint() {
    let site: HashMap<&'static str, &'static str> = HashMap::from([
        ("/", r#"<a href="/a">a</a><a href="/b">b</a>"#),
        ("/a", r#"<a href="/">home</a><a href="/b">b</a><a href="/c">c</a>"#),
        ("/b", r#"<a href="/a">a</a>"#),
        ("/c", r#"<a href="/c">self</a>"#),
    ]);

    struct Crawl {
        site: HashMap<&'static str, &'static str>,
        seen: Mutex<HashSet<String>>,
        visits: Mutex<Vec<String>>,
    }

    fn enqueue(queue: &TaskQueue<String>, state: &Arc<Crawl>, path: String) -> Result<(), QueueError<String>> {
        if !state.seen.lock().unwrap().insert(path.clone()) {
            return Ok(());
        }
        let (queue_handle, state) = (queue.clone(), Arc::clone(state));
        queue.add(async move {
            tokio::task::yield_now().await;
            state.visits.lock().unwrap().push(path.clone());
            let html = state.site.get(path.as_str()).ok_or_else(|| format!("404 {path}"))?;
            for href in crawl(html, &path).hrefs {
                enqueue(&queue_handle, &state, href).map_err(|e| e.to_string())?;
            }
            Ok(())
        })?;
        Ok(())
    }

    let state = Arc::new(Crawl {
        site,
        seen: Mutex::new(HashSet::new()),
        visits: Mutex::new(Vec::new()),
    });
    let queue = TaskQueue::new(2);
    enqueue(&queue, &state, "/".to_string()).unwrap();
    queue.done().await.unwrap();

    let mut visits = state.visits.lock().unwrap().clone();
    visits.sort();
    assert_eq!(visits, vec!["/", "/a", "/b", "/c"]);
}
